//! Activity log recorder
//!
//! Decides whether an observed mutation should be logged, sanitizes the
//! request payload, extracts target identity, and writes one entry through
//! the configured sink. Best-effort by contract: nothing here ever returns an
//! error to the write path that triggered it.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::store::Document;

use super::context::{RequestContext, VARIABLES_KEY};
use super::models::{MutationEvent, NewActivityLog, ACTIVITY_LOG_COLLECTION};
use super::sink::AuditSink;

/// Value stored in place of redacted secrets.
pub const REDACTION_MARKER: &str = "*****";

const PASSWORD_KEY: &str = "password";
const COLLECTION_NAME_KEY: &str = "collectionName";

/// Variables key marking a token-refresh request. Refresh operations carry a
/// bearer secret and are high-frequency; they are never logged.
const REFRESH_TOKEN_VARIABLE: &str = "refreshTokenInput";

/// Builds and persists activity log entries for observed mutations.
pub struct ActivityLogRecorder {
    sink: Arc<dyn AuditSink>,
    excluded_collections: HashSet<String>,
}

impl ActivityLogRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let mut excluded_collections = HashSet::new();
        excluded_collections.insert(ACTIVITY_LOG_COLLECTION.to_string());
        Self {
            sink,
            excluded_collections,
        }
    }

    /// Record one mutation. Skip rules: the audit trail's own collection and
    /// token-refresh requests. Every failure is caught and logged here; the
    /// primary write has already committed and must not observe audit
    /// trouble.
    pub async fn record(&self, event: MutationEvent, ctx: RequestContext) {
        let collection = self.collection_name(&event);
        if self
            .excluded_collections
            .contains(&collection.to_lowercase())
        {
            debug!(collection, "Skipping activity log for excluded collection");
            return;
        }

        if let Some(variables) = ctx.variables() {
            if variables.contains_key(REFRESH_TOKEN_VARIABLE) {
                debug!("Skipping activity log for token-refresh request");
                return;
            }
        }

        if collection.is_empty() {
            warn!(action = %event.action, "Activity log target has no collection name");
        }

        let document_id = event.document.as_ref().and_then(extract_document_id);
        let changes = match serde_json::to_value(&event.changes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Failed to serialize change set");
                None
            },
        };

        let entry = NewActivityLog {
            collection_name: collection,
            action: event.action,
            user_id: ctx.user.as_ref().map(|user| user.id.clone()),
            document_id,
            payload: payload_from_context(&ctx),
            changes,
        };

        match self.sink.create(entry).await {
            Ok(record) => {
                debug!(
                    log_id = %record.id,
                    action = %record.action,
                    collection = %record.collection_name,
                    document_id = ?record.document_id,
                    "Activity log entry created"
                );
            },
            Err(e) => {
                error!(error = %e, "Failed to create activity log entry");
            },
        }
    }

    /// The wrapper's bound collection name, or the document's own
    /// `collectionName` field when the binding is empty.
    fn collection_name(&self, event: &MutationEvent) -> String {
        if !event.collection.is_empty() {
            return event.collection.clone();
        }
        event
            .document
            .as_ref()
            .and_then(|doc| doc.get(COLLECTION_NAME_KEY))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Request payload for the stored entry: sanitized variables when present,
/// else the sanitized raw body, else nothing.
fn payload_from_context(ctx: &RequestContext) -> Option<JsonValue> {
    if let Some(variables) = ctx.variables() {
        if !variables.is_empty() {
            return Some(JsonValue::Object(sanitize_variables(variables)));
        }
    }
    if ctx.body.is_empty() {
        return None;
    }
    Some(JsonValue::Object(sanitize_body(&ctx.body)))
}

/// Redact `password` fields nested one level inside the variables map.
/// Operates on a copy; the live request body is never touched.
pub(crate) fn sanitize_variables(
    variables: &serde_json::Map<String, JsonValue>,
) -> serde_json::Map<String, JsonValue> {
    let mut sanitized = variables.clone();
    for value in sanitized.values_mut() {
        if let Some(object) = value.as_object() {
            if object.contains_key(PASSWORD_KEY) {
                let mut copy = object.clone();
                copy.insert(
                    PASSWORD_KEY.to_string(),
                    JsonValue::String(REDACTION_MARKER.to_string()),
                );
                *value = JsonValue::Object(copy);
            }
        }
    }
    sanitized
}

/// Sanitize a full request body by rewriting its variables map, if any.
fn sanitize_body(
    body: &serde_json::Map<String, JsonValue>,
) -> serde_json::Map<String, JsonValue> {
    let mut sanitized = body.clone();
    if let Some(variables) = body.get(VARIABLES_KEY).and_then(JsonValue::as_object) {
        sanitized.insert(
            VARIABLES_KEY.to_string(),
            JsonValue::Object(sanitize_variables(variables)),
        );
    }
    sanitized
}

/// Extract the mutated document's id from its `_id` field. Accepts plain
/// strings, extended-JSON `{"$oid": ...}` wrappers, and scalar ids coerced
/// through their string representation, in that order.
pub(crate) fn extract_document_id(doc: &Document) -> Option<String> {
    match doc.get(crate::store::ID_KEY)? {
        JsonValue::String(id) => Some(id.clone()),
        JsonValue::Object(wrapper) => wrapper
            .get("$oid")
            .and_then(JsonValue::as_str)
            .map(String::from),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
