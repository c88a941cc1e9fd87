//! Activity log data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::store::Document;

// ============================================================================
// Activity Log Constants
// ============================================================================

/// Collection the audit trail is written to. Mutations against it are never
/// themselves audited.
pub const ACTIVITY_LOG_COLLECTION: &str = "activity_logs";

/// Default number of log entries returned per query
pub const DEFAULT_LOG_QUERY_LIMIT: i64 = 100;

/// Maximum number of log entries that can be returned in a single query
pub const MAX_LOG_QUERY_LIMIT: i64 = 1000;

/// Kind of mutation an activity log entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogAction {
    Create,
    Update,
    Delete,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a [`Changes`] value was obtained: a diff computed against a
/// pre-mutation snapshot, or the requested payload reported verbatim because
/// no snapshot was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Diff,
    Payload,
}

/// Minimal before/after pair restricted to fields that actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    pub before: Document,
    pub after: Document,
    pub origin: ChangeOrigin,
}

impl Changes {
    /// Changes for a created document: empty before, the full document after.
    pub fn created(document: Document) -> Self {
        Self {
            before: Document::new(),
            after: document,
            origin: ChangeOrigin::Diff,
        }
    }

    /// Changes for a deleted document: the full document before, empty after.
    pub fn deleted(document: Document) -> Self {
        Self {
            before: document,
            after: Document::new(),
            origin: ChangeOrigin::Diff,
        }
    }

    /// The raw requested payload, reported when no snapshot exists.
    pub fn requested(payload: Document) -> Self {
        Self {
            before: Document::new(),
            after: payload,
            origin: ChangeOrigin::Payload,
        }
    }

    /// No discernible change on either side.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// One observed mutation, handed from the interception layer to the recorder.
/// Consumed immediately; never shared across operations.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub action: LogAction,
    pub collection: String,
    pub document: Option<Document>,
    pub changes: Changes,
}

/// A persisted activity log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    /// Collection the mutated document belongs to
    pub collection_name: String,
    /// CREATE, UPDATE or DELETE
    pub action: String,
    /// Id of the user who performed the mutation, when known
    pub user_id: Option<String>,
    /// Id of the mutated document, when extractable
    pub document_id: Option<String>,
    /// Sanitized request payload that triggered the mutation
    pub payload: Option<JsonValue>,
    /// Before/after delta of the mutated fields
    pub changes: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivityLog {
    pub collection_name: String,
    pub action: LogAction,
    pub user_id: Option<String>,
    pub document_id: Option<String>,
    pub payload: Option<JsonValue>,
    pub changes: Option<JsonValue>,
}

/// Query parameters for reading the audit trail
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityLogQuery {
    pub collection_name: Option<String>,
    pub action: Option<LogAction>,
    pub user_id: Option<String>,
    pub document_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LOG_QUERY_LIMIT
}

impl Default for ActivityLogQuery {
    fn default() -> Self {
        Self {
            collection_name: None,
            action: None,
            user_id: None,
            document_id: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ActivityLogQuery {
    /// Effective limit, clamped to the query maximum.
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(0, MAX_LOG_QUERY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_action_as_str() {
        assert_eq!(LogAction::Create.as_str(), "CREATE");
        assert_eq!(LogAction::Update.as_str(), "UPDATE");
        assert_eq!(LogAction::Delete.as_str(), "DELETE");
    }

    #[test]
    fn log_action_serialization() {
        let json = serde_json::to_string(&LogAction::Create).unwrap();
        assert_eq!(json, r#""CREATE""#);

        let action: LogAction = serde_json::from_str(r#""UPDATE""#).unwrap();
        assert_eq!(action, LogAction::Update);
    }

    #[test]
    fn changes_emptiness() {
        assert!(Changes::created(Document::new()).is_empty());

        let doc = json!({"a": 1}).as_object().cloned().unwrap();
        assert!(!Changes::created(doc.clone()).is_empty());
        assert!(!Changes::deleted(doc).is_empty());
    }

    #[test]
    fn change_origin_serialization() {
        let changes = Changes::requested(json!({"x": 1}).as_object().cloned().unwrap());
        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(value["origin"], "payload");
        assert_eq!(value["after"]["x"], 1);
    }

    #[test]
    fn query_limit_clamped() {
        let query = ActivityLogQuery {
            limit: 10_000,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_LOG_QUERY_LIMIT);
        assert_eq!(ActivityLogQuery::default().effective_limit(), DEFAULT_LOG_QUERY_LIMIT);
    }
}
