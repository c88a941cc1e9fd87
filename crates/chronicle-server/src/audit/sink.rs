//! Audit storage sinks
//!
//! The recorder writes through the [`AuditSink`] trait: one append-only
//! `create` per logged mutation plus the read side exposed to downstream
//! consumers. [`PgAuditSink`] persists to the `activity_logs` table;
//! [`MemoryAuditSink`] backs tests and the dev mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::models::{ActivityLog, ActivityLogQuery, NewActivityLog};

/// Audit sink operation errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Storage for activity log entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one entry. At-most-once; the caller never retries.
    async fn create(&self, entry: NewActivityLog) -> SinkResult<ActivityLog>;

    /// Read entries matching `query`, newest first.
    async fn list(&self, query: ActivityLogQuery) -> SinkResult<Vec<ActivityLog>>;
}

// ============================================================================
// Postgres sink
// ============================================================================

/// [`AuditSink`] writing to the `activity_logs` table.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn create(&self, entry: NewActivityLog) -> SinkResult<ActivityLog> {
        let record = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (
                id, collection_name, action, user_id, document_id, payload, changes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, collection_name, action, user_id, document_id,
                      payload, changes, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.collection_name)
        .bind(entry.action.as_str())
        .bind(&entry.user_id)
        .bind(&entry.document_id)
        .bind(&entry.payload)
        .bind(&entry.changes)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            log_id = %record.id,
            action = %record.action,
            collection = %record.collection_name,
            "Created activity log entry"
        );

        Ok(record)
    }

    async fn list(&self, query: ActivityLogQuery) -> SinkResult<Vec<ActivityLog>> {
        let mut sql = String::from(
            r#"
            SELECT id, collection_name, action, user_id, document_id,
                   payload, changes, created_at, updated_at
            FROM activity_logs
            WHERE 1=1
            "#,
        );

        let mut bind_count = 1;
        let mut conditions = Vec::new();

        if query.collection_name.is_some() {
            conditions.push(format!("collection_name = ${}", bind_count));
            bind_count += 1;
        }
        if query.action.is_some() {
            conditions.push(format!("action = ${}", bind_count));
            bind_count += 1;
        }
        if query.user_id.is_some() {
            conditions.push(format!("user_id = ${}", bind_count));
            bind_count += 1;
        }
        if query.document_id.is_some() {
            conditions.push(format!("document_id = ${}", bind_count));
            bind_count += 1;
        }

        for condition in conditions {
            sql.push_str(" AND ");
            sql.push_str(&condition);
        }

        sql.push_str(" ORDER BY created_at DESC");
        sql.push_str(&format!(" LIMIT ${}", bind_count));
        bind_count += 1;
        sql.push_str(&format!(" OFFSET ${}", bind_count));

        let mut query_builder = sqlx::query_as::<_, ActivityLog>(&sql);

        if let Some(ref collection_name) = query.collection_name {
            query_builder = query_builder.bind(collection_name);
        }
        if let Some(action) = query.action {
            query_builder = query_builder.bind(action.as_str());
        }
        if let Some(ref user_id) = query.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(ref document_id) = query.document_id {
            query_builder = query_builder.bind(document_id);
        }

        let records = query_builder
            .bind(query.effective_limit())
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = records.len(), "Queried activity logs");

        Ok(records)
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// [`AuditSink`] keeping entries in process memory. Used by tests (including
/// failure injection) and the zero-configuration dev mode.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<ActivityLog>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail, for exercising the recorder's
    /// error path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all stored entries, oldest first.
    pub fn entries(&self) -> Vec<ActivityLog> {
        self.lock().clone()
    }

    /// Wait until at least `count` entries exist, polling briefly. Returns
    /// the entries seen, whether or not the count was reached; recording is
    /// fire-and-forget, so tests need a bounded wait.
    pub async fn wait_for_entries(&self, count: usize) -> Vec<ActivityLog> {
        for _ in 0..200 {
            {
                let entries = self.lock();
                if entries.len() >= count {
                    return entries.clone();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.entries()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ActivityLog>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn create(&self, entry: NewActivityLog) -> SinkResult<ActivityLog> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("injected failure".to_string()));
        }

        let now = Utc::now();
        let record = ActivityLog {
            id: Uuid::new_v4(),
            collection_name: entry.collection_name,
            action: entry.action.as_str().to_string(),
            user_id: entry.user_id,
            document_id: entry.document_id,
            payload: entry.payload,
            changes: entry.changes,
            created_at: now,
            updated_at: now,
        };
        self.lock().push(record.clone());
        Ok(record)
    }

    async fn list(&self, query: ActivityLogQuery) -> SinkResult<Vec<ActivityLog>> {
        let entries = self.lock();
        let matches = entries
            .iter()
            .rev()
            .filter(|entry| {
                query
                    .collection_name
                    .as_ref()
                    .is_none_or(|name| &entry.collection_name == name)
                    && query.action.is_none_or(|action| entry.action == action.as_str())
                    && query.user_id.as_ref().is_none_or(|id| entry.user_id.as_ref() == Some(id))
                    && query
                        .document_id
                        .as_ref()
                        .is_none_or(|id| entry.document_id.as_ref() == Some(id))
            })
            .skip(query.offset.max(0) as usize)
            .take(query.effective_limit() as usize)
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::LogAction;
    use serde_json::json;

    fn entry(collection: &str, action: LogAction, user: Option<&str>) -> NewActivityLog {
        NewActivityLog {
            collection_name: collection.to_string(),
            action,
            user_id: user.map(String::from),
            document_id: None,
            payload: Some(json!({"k": "v"})),
            changes: None,
        }
    }

    #[tokio::test]
    async fn create_and_list_newest_first() {
        let sink = MemoryAuditSink::new();
        sink.create(entry("users", LogAction::Create, None)).await.unwrap();
        sink.create(entry("users", LogAction::Update, None)).await.unwrap();

        let logs = sink.list(ActivityLogQuery::default()).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "UPDATE");
        assert_eq!(logs[1].action, "CREATE");
    }

    #[tokio::test]
    async fn list_filters_by_action_and_user() {
        let sink = MemoryAuditSink::new();
        sink.create(entry("users", LogAction::Create, Some("U1"))).await.unwrap();
        sink.create(entry("users", LogAction::Update, Some("U2"))).await.unwrap();

        let logs = sink
            .list(ActivityLogQuery {
                action: Some(LogAction::Update),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id.as_deref(), Some("U2"));

        let logs = sink
            .list(ActivityLogQuery {
                user_id: Some("U1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "CREATE");
    }

    #[tokio::test]
    async fn failure_injection() {
        let sink = MemoryAuditSink::new();
        sink.set_failing(true);
        let result = sink.create(entry("users", LogAction::Create, None)).await;
        assert!(matches!(result, Err(SinkError::Unavailable(_))));
        assert!(sink.entries().is_empty());
    }
}
