//! Write interception
//!
//! [`AuditedCollection`] wraps a [`DocumentStore`] handle for one named
//! collection and observes every mutating operation without changing call
//! sites beyond construction: the wrapped operation completes (or fails)
//! exactly as it would unwrapped, and recording happens on a detached task
//! after the write is durable.
//!
//! Per-operation sequence: the pre-write step reads the fields the pending
//! update touches and parks them in the snapshot cache (the write waits for
//! this read, so the snapshot reflects pre-write state); the post-write step
//! consumes the snapshot, computes the delta, and hands the recorder a
//! fire-and-forget task. The snapshot entry is evicted whether or not
//! recording succeeds.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::store::{
    Document, DocumentStore, Filter, StoreResult, UpdateSpec, ID_KEY, UPDATED_AT_KEY,
};

use super::context::RequestContext;
use super::diff;
use super::models::{Changes, LogAction, MutationEvent};
use super::recorder::ActivityLogRecorder;
use super::snapshot::SnapshotCache;

/// A collection handle whose writes feed the activity log.
#[derive(Clone)]
pub struct AuditedCollection {
    name: String,
    store: Arc<dyn DocumentStore>,
    recorder: Arc<ActivityLogRecorder>,
    snapshots: Arc<SnapshotCache>,
}

impl AuditedCollection {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        recorder: Arc<ActivityLogRecorder>,
        snapshots: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            recorder,
            snapshots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Reads: uninstrumented passthroughs
    // ------------------------------------------------------------------

    pub async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Document>> {
        self.store.find_one(&self.name, filter, projection).await
    }

    pub async fn find_many(
        &self,
        filter: &Filter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>> {
        self.store.find_many(&self.name, filter, skip, limit).await
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(&self.name, filter).await
    }

    // ------------------------------------------------------------------
    // Writes: observed
    // ------------------------------------------------------------------

    /// Insert a new document. No pre-write snapshot: the before state is
    /// empty and the after state is the full stored document.
    pub async fn insert_one(
        &self,
        ctx: &RequestContext,
        document: Document,
    ) -> StoreResult<Document> {
        let stored = self.store.insert_one(&self.name, document).await?;
        self.dispatch(
            ctx,
            MutationEvent {
                action: LogAction::Create,
                collection: self.name.clone(),
                document: Some(stored.clone()),
                changes: Changes::created(stored.clone()),
            },
        );
        Ok(stored)
    }

    /// Upsert by `_id`: replaces the existing document when one exists,
    /// inserts otherwise.
    pub async fn save(&self, ctx: &RequestContext, document: Document) -> StoreResult<Document> {
        let existing_id = document
            .get(ID_KEY)
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        if let Some(id) = existing_id {
            let filter = Filter::by_id(&id);
            let id_projection = [ID_KEY.to_string()];
            let exists = self
                .store
                .find_one(&self.name, &filter, Some(&id_projection))
                .await?
                .is_some();
            if exists {
                if let Some(replaced) = self.replace_inner(ctx, &filter, document.clone()).await? {
                    return Ok(replaced);
                }
                // The document vanished between the existence check and the
                // replace; fall through to a plain insert.
            }
        }

        self.insert_one(ctx, document).await
    }

    /// Apply an update to the first matching document. Returns whether a
    /// document matched.
    pub async fn update_one(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<bool> {
        Ok(self.update_inner(ctx, filter, update).await?.is_some())
    }

    /// Find-and-modify variant of [`Self::update_one`]: returns the updated
    /// document.
    pub async fn find_one_and_update(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<Option<Document>> {
        self.update_inner(ctx, filter, update).await
    }

    /// Replace the first matching document wholesale. Returns whether a
    /// document matched.
    pub async fn replace_one(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<bool> {
        Ok(self.replace_inner(ctx, filter, document).await?.is_some())
    }

    /// Find-and-modify variant of [`Self::replace_one`]: returns the new
    /// document.
    pub async fn find_one_and_replace(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        self.replace_inner(ctx, filter, document).await
    }

    /// Delete the first matching document. Returns whether one existed.
    pub async fn delete_one(&self, ctx: &RequestContext, filter: &Filter) -> StoreResult<bool> {
        Ok(self.delete_inner(ctx, filter).await?.is_some())
    }

    /// Find-and-modify variant of [`Self::delete_one`]: returns the deleted
    /// document.
    pub async fn find_one_and_delete(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        self.delete_inner(ctx, filter).await
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    async fn update_inner(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<Option<Document>> {
        self.snapshot_before(filter, update.tracked_keys()).await;

        match self.store.update_one(&self.name, filter, update).await {
            Ok(outcome) => {
                self.finish_update(ctx, filter, update.set_fields(), outcome.clone());
                Ok(outcome)
            },
            Err(error) => {
                self.snapshots.remove(&filter.cache_key());
                Err(error)
            },
        }
    }

    async fn replace_inner(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        let tracked: Vec<String> = document.keys().cloned().collect();
        self.snapshot_before(filter, tracked).await;

        match self
            .store
            .replace_one(&self.name, filter, document.clone())
            .await
        {
            Ok(outcome) => {
                self.finish_update(ctx, filter, document, outcome.clone());
                Ok(outcome)
            },
            Err(error) => {
                self.snapshots.remove(&filter.cache_key());
                Err(error)
            },
        }
    }

    async fn delete_inner(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        let outcome = self.store.delete_one(&self.name, filter).await?;
        if let Some(document) = &outcome {
            self.dispatch(
                ctx,
                MutationEvent {
                    action: LogAction::Delete,
                    collection: self.name.clone(),
                    document: Some(document.clone()),
                    changes: Changes::deleted(document.clone()),
                },
            );
        }
        Ok(outcome)
    }

    /// Pre-write step: capture the current values of the fields the pending
    /// update touches, plus the last-modified timestamp for drift detection.
    /// A failed or empty read stores "no snapshot"; the write proceeds
    /// unimpeded either way.
    async fn snapshot_before(&self, filter: &Filter, mut keys: Vec<String>) {
        if !keys.iter().any(|key| key == UPDATED_AT_KEY) {
            keys.push(UPDATED_AT_KEY.to_string());
        }
        let cache_key = filter.cache_key();

        match self.store.find_one(&self.name, filter, Some(&keys)).await {
            Ok(Some(snapshot)) => self.snapshots.put(cache_key, snapshot),
            Ok(None) => self.snapshots.remove(&cache_key),
            Err(error) => {
                warn!(
                    collection = %self.name,
                    %error,
                    "Pre-update snapshot read failed; proceeding without one"
                );
                self.snapshots.remove(&cache_key);
            },
        }
    }

    /// Post-write step for updates and replaces. Always consumes the
    /// snapshot entry; emits nothing when no document matched.
    fn finish_update(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        requested: Document,
        outcome: Option<Document>,
    ) {
        let snapshot = self.snapshots.take(&filter.cache_key());
        let Some(document) = outcome else {
            return;
        };

        let changes = diff::update_changes(snapshot, requested);
        self.dispatch(
            ctx,
            MutationEvent {
                action: LogAction::Update,
                collection: self.name.clone(),
                document: Some(document),
                changes,
            },
        );
    }

    /// Hand the event to the recorder on a detached task. The caller's
    /// write has already committed; it never waits for, or observes,
    /// recording.
    fn dispatch(&self, ctx: &RequestContext, event: MutationEvent) {
        if event.changes.is_empty() {
            debug!(
                collection = %event.collection,
                action = %event.action,
                "No discernible change; skipping activity log"
            );
            return;
        }

        let recorder = Arc::clone(&self.recorder);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            recorder.record(event, ctx).await;
        });
    }
}
