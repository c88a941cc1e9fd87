//! Postgres-backed document store
//!
//! One JSONB row per document in the `documents` table, keyed by collection
//! name plus `_id`. Filters are evaluated in Rust against fetched candidates;
//! plain `_id` filters hit the primary key directly. Single-document
//! mutations take a row lock so the read-modify-write is atomic.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};

use super::{
    document_id, now_timestamp, prepare_insert, project, Document, DocumentStore, Filter,
    StoreError, StoreResult, UpdateSpec, CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY,
};

/// A [`DocumentStore`] over a Postgres JSONB table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DocRow {
    id: String,
    doc: JsonValue,
}

impl DocRow {
    fn into_document(self) -> StoreResult<Document> {
        match self.doc {
            JsonValue::Object(map) => Ok(map),
            other => Err(StoreError::InvalidDocument(format!(
                "row {} holds non-object JSON ({})",
                self.id,
                type_name(&other)
            ))),
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the first document matching `filter`, together with its row id.
    /// `lock` selects `FOR UPDATE` for use inside a transaction.
    async fn fetch_match<'e, E: PgExecutor<'e>>(
        executor: E,
        collection: &str,
        filter: &Filter,
        lock: bool,
    ) -> StoreResult<Option<(String, Document)>> {
        let rows: Vec<DocRow> = if let Some(id) = filter.id_equality() {
            let sql = if lock {
                "SELECT id, doc FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE"
            } else {
                "SELECT id, doc FROM documents WHERE collection = $1 AND id = $2"
            };
            sqlx::query_as::<_, DocRow>(sql)
                .bind(collection)
                .bind(id)
                .fetch_all(executor)
                .await?
        } else {
            let sql = if lock {
                "SELECT id, doc FROM documents WHERE collection = $1 ORDER BY inserted_at, id FOR UPDATE"
            } else {
                "SELECT id, doc FROM documents WHERE collection = $1 ORDER BY inserted_at, id"
            };
            sqlx::query_as::<_, DocRow>(sql)
                .bind(collection)
                .fetch_all(executor)
                .await?
        };

        for row in rows {
            let id = row.id.clone();
            let doc = row.into_document()?;
            if filter.matches(&doc) {
                return Ok(Some((id, doc)));
            }
        }
        Ok(None)
    }

    async fn fetch_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocRow>(
            "SELECT id, doc FROM documents WHERE collection = $1 ORDER BY inserted_at, id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocRow::into_document).collect()
    }

    async fn write_back<'e, E: PgExecutor<'e>>(
        executor: E,
        collection: &str,
        id: &str,
        doc: &Document,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE documents SET doc = $3 WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .bind(JsonValue::Object(doc.clone()))
            .execute(executor)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Document>> {
        let found = Self::fetch_match(&self.pool, collection, filter, false).await?;
        Ok(found.map(|(_, doc)| match projection {
            Some(fields) => project(&doc, fields),
            None => doc,
        }))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>> {
        let docs = self.fetch_all(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let docs = self.fetch_all(collection).await?;
        Ok(docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document> {
        let document = prepare_insert(document);
        let id = document_id(&document)
            .ok_or_else(|| StoreError::InvalidDocument("document _id must be a string".into()))?
            .to_string();

        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(JsonValue::Object(document.clone()))
            .execute(&self.pool)
            .await?;

        Ok(document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let Some((id, mut doc)) = Self::fetch_match(&mut *tx, collection, filter, true).await?
        else {
            return Ok(None);
        };

        update.apply(&mut doc);
        Self::write_back(&mut *tx, collection, &id, &doc).await?;
        tx.commit().await?;

        Ok(Some(doc))
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let Some((id, old)) = Self::fetch_match(&mut *tx, collection, filter, true).await? else {
            return Ok(None);
        };

        let mut replacement = document;
        for key in [ID_KEY, CREATED_AT_KEY] {
            if let Some(value) = old.get(key) {
                replacement.entry(key.to_string()).or_insert_with(|| value.clone());
            }
        }
        replacement.insert(UPDATED_AT_KEY.to_string(), now_timestamp());

        Self::write_back(&mut *tx, collection, &id, &replacement).await?;
        tx.commit().await?;

        Ok(Some(replacement))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let Some((id, doc)) = Self::fetch_match(&mut *tx, collection, filter, true).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(doc))
    }
}
