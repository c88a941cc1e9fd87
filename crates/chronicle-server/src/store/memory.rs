//! In-process document store
//!
//! Backs tests and the zero-configuration dev mode. Documents are kept per
//! collection in insertion order behind a single mutex; the lock is only held
//! for the duration of each synchronous scan, never across awaits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    now_timestamp, prepare_insert, project, Document, DocumentStore, Filter, StoreResult,
    UpdateSpec, CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY,
};

/// An in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collection<T>(&self, collection: &str, f: impl FnOnce(&mut Vec<Document>) -> T) -> T {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(collections.entry(collection.to_string()).or_default())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Document>> {
        Ok(self.with_collection(collection, |docs| {
            docs.iter().find(|doc| filter.matches(doc)).map(|doc| match projection {
                Some(fields) => project(doc, fields),
                None => doc.clone(),
            })
        }))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>> {
        Ok(self.with_collection(collection, |docs| {
            docs.iter()
                .filter(|doc| filter.matches(doc))
                .skip(skip as usize)
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        Ok(self.with_collection(collection, |docs| {
            docs.iter().filter(|doc| filter.matches(doc)).count() as u64
        }))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document> {
        let document = prepare_insert(document);
        self.with_collection(collection, |docs| docs.push(document.clone()));
        Ok(document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> StoreResult<Option<Document>> {
        Ok(self.with_collection(collection, |docs| {
            let target = docs.iter_mut().find(|doc| filter.matches(doc))?;
            update.apply(target);
            Some(target.clone())
        }))
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        Ok(self.with_collection(collection, |docs| {
            let target = docs.iter_mut().find(|doc| filter.matches(doc))?;
            let mut replacement = document;
            for key in [ID_KEY, CREATED_AT_KEY] {
                if let Some(value) = target.get(key) {
                    replacement.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
            replacement.insert(UPDATED_AT_KEY.to_string(), now_timestamp());
            *target = replacement;
            Some(target.clone())
        }))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        Ok(self.with_collection(collection, |docs| {
            let index = docs.iter().position(|doc| filter.matches(doc))?;
            Some(docs.remove(index))
        }))
    }
}
