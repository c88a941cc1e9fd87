//! Document store abstraction
//!
//! Collections of schemaless JSON documents with Mongo-shaped filters and
//! updates. Two backends are provided: an in-process [`MemoryStore`] used by
//! tests and the zero-configuration dev mode, and a Postgres-backed
//! [`PgStore`] keeping one JSONB row per document.
//!
//! Every mutating operation returns the affected document (the post-image for
//! updates and replaces, the pre-image for deletes) so callers observing
//! writes always have the resulting state without a second read.

mod filter;
mod memory;
mod postgres;
mod update;

pub use filter::Filter;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use update::UpdateSpec;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// A stored document: a flat JSON object keyed by field name.
pub type Document = serde_json::Map<String, JsonValue>;

/// Primary-key field carried by every document.
pub const ID_KEY: &str = "_id";

/// Creation timestamp field, assigned on insert.
pub const CREATED_AT_KEY: &str = "createdAt";

/// Last-modified timestamp field, bumped on every write.
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// Document store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Async driver interface over named collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the first document matching `filter`, optionally restricted to
    /// the given fields.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Document>>;

    /// Find all matching documents in insertion order, with skip/limit.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>>;

    /// Count matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Insert a document, assigning `_id` and timestamps when missing.
    /// Returns the stored document.
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document>;

    /// Apply `update` to the first matching document. Returns the updated
    /// document, or `None` when nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<Option<Document>>;

    /// Replace the first matching document wholesale, preserving its `_id`
    /// and creation timestamp. Returns the new document, or `None` when
    /// nothing matched.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<Option<Document>>;

    /// Delete the first matching document. Returns the deleted document, or
    /// `None` when nothing matched.
    async fn delete_one(&self, collection: &str, filter: &Filter)
        -> StoreResult<Option<Document>>;
}

/// Current time as the RFC 3339 string stored inside documents.
pub(crate) fn now_timestamp() -> JsonValue {
    JsonValue::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Restrict a document to the requested fields. Fields absent from the
/// document are simply omitted.
pub(crate) fn project(doc: &Document, fields: &[String]) -> Document {
    let mut out = Document::new();
    for field in fields {
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

/// Fill in `_id` and timestamps for a document about to be inserted.
pub(crate) fn prepare_insert(mut doc: Document) -> Document {
    if !doc.contains_key(ID_KEY) {
        doc.insert(
            ID_KEY.to_string(),
            JsonValue::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    let now = now_timestamp();
    doc.entry(CREATED_AT_KEY.to_string()).or_insert_with(|| now.clone());
    doc.insert(UPDATED_AT_KEY.to_string(), now);
    doc
}

/// Extract a document's `_id` as a string, when present and textual.
pub(crate) fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_KEY).and_then(JsonValue::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn prepare_insert_assigns_id_and_timestamps() {
        let prepared = prepare_insert(doc(json!({"name": "x"})));
        assert!(prepared.get(ID_KEY).and_then(JsonValue::as_str).is_some());
        assert!(prepared.contains_key(CREATED_AT_KEY));
        assert!(prepared.contains_key(UPDATED_AT_KEY));
    }

    #[test]
    fn prepare_insert_keeps_existing_id() {
        let prepared = prepare_insert(doc(json!({"_id": "abc"})));
        assert_eq!(document_id(&prepared), Some("abc"));
    }

    #[test]
    fn project_keeps_only_requested_fields() {
        let source = doc(json!({"a": 1, "b": 2, "c": 3}));
        let projected = project(&source, &["a".to_string(), "c".to_string(), "missing".to_string()]);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get("a"), Some(&json!(1)));
        assert_eq!(projected.get("c"), Some(&json!(3)));
    }
}
