use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use crate::store::{Document, DocumentStore, Filter, MemoryStore, UpdateSpec};

use super::context::{RequestContext, UserIdentity};
use super::intercept::AuditedCollection;
use super::recorder::{ActivityLogRecorder, REDACTION_MARKER};
use super::sink::MemoryAuditSink;
use super::snapshot::{SnapshotCache, DEFAULT_SNAPSHOT_TTL};

struct Harness {
    store: Arc<MemoryStore>,
    sink: Arc<MemoryAuditSink>,
    snapshots: Arc<SnapshotCache>,
    users: AuditedCollection,
}

fn harness() -> Harness {
    harness_with_ttl(DEFAULT_SNAPSHOT_TTL)
}

fn harness_with_ttl(ttl: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let snapshots = Arc::new(SnapshotCache::new(ttl));
    let recorder = Arc::new(ActivityLogRecorder::new(sink.clone()));
    let users = AuditedCollection::new(
        "users",
        store.clone() as Arc<dyn DocumentStore>,
        recorder,
        snapshots.clone(),
    );
    Harness {
        store,
        sink,
        snapshots,
        users,
    }
}

fn collection(h: &Harness, name: &str) -> AuditedCollection {
    let recorder = Arc::new(ActivityLogRecorder::new(h.sink.clone()));
    AuditedCollection::new(
        name,
        h.store.clone() as Arc<dyn DocumentStore>,
        recorder,
        h.snapshots.clone(),
    )
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

fn ctx_with_variables(variables: serde_json::Value) -> RequestContext {
    let body = doc(json!({"operationName": "test", "variables": variables}));
    RequestContext::new(body, None)
}

fn user_ctx(id: &str) -> RequestContext {
    RequestContext::new(
        Document::new(),
        Some(UserIdentity { id: id.to_string() }),
    )
}

async fn seed_user(h: &Harness) {
    h.store
        .insert_one(
            "users",
            doc(json!({"_id": "U1", "firstName": "Alice", "lastName": "Smith"})),
        )
        .await
        .unwrap();
}

/// Give detached recording tasks a chance to run before asserting absence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn create_records_full_document() {
    let h = harness();
    let ctx = RequestContext::background();

    let stored = h
        .users
        .insert_one(&ctx, doc(json!({"firstName": "Alice", "email": "a@b.com"})))
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.action, "CREATE");
    assert_eq!(entry.collection_name, "users");
    assert_eq!(
        entry.document_id.as_deref(),
        stored.get("_id").and_then(JsonValue::as_str)
    );

    let changes = entry.changes.as_ref().unwrap();
    assert_eq!(changes["before"], json!({}));
    assert_eq!(changes["after"], JsonValue::Object(stored));
    assert_eq!(changes["origin"], "diff");
}

#[tokio::test]
async fn update_records_only_changed_fields() {
    let h = harness();
    seed_user(&h).await;
    let ctx = user_ctx("admin-1");

    let updated = h
        .users
        .find_one_and_update(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get("firstName"), Some(&json!("Bob")));

    let entries = h.sink.wait_for_entries(1).await;
    let entry = &entries[0];
    assert_eq!(entry.action, "UPDATE");
    assert_eq!(entry.document_id.as_deref(), Some("U1"));
    assert_eq!(entry.user_id.as_deref(), Some("admin-1"));

    // Unchanged lastName and the drift-detection timestamp are absent.
    let changes = entry.changes.as_ref().unwrap();
    assert_eq!(changes["before"], json!({"firstName": "Alice"}));
    assert_eq!(changes["after"], json!({"firstName": "Bob"}));
    assert_eq!(changes["origin"], "diff");
}

#[tokio::test]
async fn update_with_unchanged_value_records_nothing() {
    let h = harness();
    seed_user(&h).await;
    let ctx = RequestContext::background();

    let matched = h
        .users
        .update_one(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Alice"}))),
        )
        .await
        .unwrap();
    assert!(matched);

    settle().await;
    assert!(h.sink.entries().is_empty());
}

#[tokio::test]
async fn update_without_snapshot_reports_requested_payload() {
    // A zero TTL expires every snapshot before the post-write step reads it,
    // which is exactly the missing-snapshot case.
    let h = harness_with_ttl(Duration::ZERO);
    seed_user(&h).await;
    let ctx = RequestContext::background();

    h.users
        .update_one(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let changes = entries[0].changes.as_ref().unwrap();
    assert_eq!(changes["origin"], "payload");
    assert_eq!(changes["before"], json!({}));
    assert_eq!(changes["after"], json!({"firstName": "Bob"}));
}

#[tokio::test]
async fn delete_records_pre_image() {
    let h = harness();
    seed_user(&h).await;
    let ctx = RequestContext::background();

    let deleted = h
        .users
        .find_one_and_delete(&ctx, &Filter::by_id("U1"))
        .await
        .unwrap()
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let entry = &entries[0];
    assert_eq!(entry.action, "DELETE");

    let changes = entry.changes.as_ref().unwrap();
    assert_eq!(changes["after"], json!({}));
    assert_eq!(changes["before"], JsonValue::Object(deleted));
}

#[tokio::test]
async fn delete_of_missing_document_records_nothing() {
    let h = harness();
    let ctx = RequestContext::background();

    let existed = h.users.delete_one(&ctx, &Filter::by_id("ghost")).await.unwrap();
    assert!(!existed);

    settle().await;
    assert!(h.sink.entries().is_empty());
}

#[tokio::test]
async fn audit_collection_is_never_self_logged() {
    let h = harness();
    let ctx = RequestContext::background();

    let logs = collection(&h, "activity_logs");
    logs.insert_one(&ctx, doc(json!({"note": "meta"}))).await.unwrap();

    // Case-insensitive exclusion.
    let shouty = collection(&h, "ACTIVITY_LOGS");
    shouty.insert_one(&ctx, doc(json!({"note": "meta"}))).await.unwrap();

    settle().await;
    assert!(h.sink.entries().is_empty());
}

#[tokio::test]
async fn refresh_token_requests_are_not_logged() {
    let h = harness();
    seed_user(&h).await;
    let ctx = ctx_with_variables(json!({
        "refreshTokenInput": {"refreshToken": "bearer-secret"}
    }));

    h.users
        .update_one(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"lastActiveAt": "2026-08-06T00:00:00Z"}))),
        )
        .await
        .unwrap();

    settle().await;
    assert!(h.sink.entries().is_empty());
}

#[tokio::test]
async fn passwords_are_redacted_in_stored_payload() {
    let h = harness();
    let ctx = ctx_with_variables(json!({
        "signupInput": {"email": "a@b.com", "password": "Secret123!"}
    }));

    h.users
        .insert_one(&ctx, doc(json!({"email": "a@b.com"})))
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let payload = entries[0].payload.as_ref().unwrap();
    assert_eq!(
        payload["signupInput"],
        json!({"email": "a@b.com", "password": REDACTION_MARKER})
    );

    // The live request body is untouched.
    assert_eq!(
        ctx.variables().unwrap()["signupInput"]["password"],
        json!("Secret123!")
    );
}

#[tokio::test]
async fn sink_failure_leaves_primary_write_intact() {
    let h = harness();
    seed_user(&h).await;
    h.sink.set_failing(true);
    let ctx = RequestContext::background();

    let updated = h
        .users
        .find_one_and_update(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get("firstName"), Some(&json!("Bob")));

    // The mutation is durable even though recording failed, and no retry
    // happens once the sink recovers.
    settle().await;
    assert!(h.sink.entries().is_empty());

    h.sink.set_failing(false);
    settle().await;
    assert!(h.sink.entries().is_empty());

    let stored = h
        .users
        .find_one(&Filter::by_id("U1"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("firstName"), Some(&json!("Bob")));
}

#[tokio::test]
async fn snapshot_entry_is_consumed_by_the_post_write_step() {
    let h = harness();
    seed_user(&h).await;
    let ctx = RequestContext::background();

    h.users
        .update_one(
            &ctx,
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap();

    assert!(h.snapshots.is_empty());
}

#[tokio::test]
async fn unmatched_update_consumes_snapshot_and_records_nothing() {
    let h = harness();
    let ctx = RequestContext::background();

    let matched = h
        .users
        .update_one(
            &ctx,
            &Filter::by_id("ghost"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap();
    assert!(!matched);

    settle().await;
    assert!(h.sink.entries().is_empty());
    assert!(h.snapshots.is_empty());
}

#[tokio::test]
async fn save_of_existing_document_records_update() {
    let h = harness();
    seed_user(&h).await;
    let ctx = RequestContext::background();

    h.users
        .save(
            &ctx,
            doc(json!({"_id": "U1", "firstName": "Carol", "lastName": "Smith"})),
        )
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let entry = &entries[0];
    assert_eq!(entry.action, "UPDATE");

    let changes = entry.changes.as_ref().unwrap();
    assert_eq!(changes["before"]["firstName"], json!("Alice"));
    assert_eq!(changes["after"]["firstName"], json!("Carol"));
    // lastName did not change and is absent from the delta.
    assert!(changes["before"].get("lastName").is_none());
}

#[tokio::test]
async fn save_of_new_document_records_create() {
    let h = harness();
    let ctx = RequestContext::background();

    h.users
        .save(&ctx, doc(json!({"firstName": "Dora"})))
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    assert_eq!(entries[0].action, "CREATE");
}

#[tokio::test]
async fn replace_records_update_with_delta() {
    let h = harness();
    seed_user(&h).await;
    let ctx = RequestContext::background();

    h.users
        .find_one_and_replace(
            &ctx,
            &Filter::by_id("U1"),
            doc(json!({"firstName": "Eve", "lastName": "Smith"})),
        )
        .await
        .unwrap()
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let changes = entries[0].changes.as_ref().unwrap();
    assert_eq!(changes["before"], json!({"firstName": "Alice"}));
    assert_eq!(changes["after"], json!({"firstName": "Eve"}));
}

#[tokio::test]
async fn background_mutation_logs_null_identity_and_payload() {
    let h = harness();
    seed_user(&h).await;

    h.users
        .update_one(
            &RequestContext::background(),
            &Filter::by_id("U1"),
            &UpdateSpec::set(doc(json!({"firstName": "Bob"}))),
        )
        .await
        .unwrap();

    let entries = h.sink.wait_for_entries(1).await;
    let entry = &entries[0];
    assert_eq!(entry.user_id, None);
    assert_eq!(entry.payload, None);
    assert!(entry.changes.is_some());
}

#[tokio::test]
async fn concurrent_updates_to_different_documents_both_log() {
    let h = harness();
    h.store
        .insert_one("users", doc(json!({"_id": "U1", "firstName": "Alice"})))
        .await
        .unwrap();
    h.store
        .insert_one("users", doc(json!({"_id": "U2", "firstName": "Greta"})))
        .await
        .unwrap();
    let ctx = RequestContext::background();

    let filter_u1 = Filter::by_id("U1");
    let update_u1 = UpdateSpec::set(doc(json!({"firstName": "Bob"})));
    let filter_u2 = Filter::by_id("U2");
    let update_u2 = UpdateSpec::set(doc(json!({"firstName": "Hans"})));
    let (a, b) = tokio::join!(
        h.users.update_one(&ctx, &filter_u1, &update_u1),
        h.users.update_one(&ctx, &filter_u2, &update_u2),
    );
    assert!(a.unwrap());
    assert!(b.unwrap());

    let entries = h.sink.wait_for_entries(2).await;
    assert_eq!(entries.len(), 2);
    let mut ids: Vec<_> = entries.iter().filter_map(|e| e.document_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["U1".to_string(), "U2".to_string()]);
}
