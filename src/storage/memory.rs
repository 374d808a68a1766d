use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{identity, Document, ID_FIELD};
use crate::filter::Query;
use crate::storage::{BackendError, CollectionRef, FindOptions, StorageBackend, WriteResult};

/// Process-local reference backend; collections are created on first write
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionRef, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored document of a collection, in insertion order
    pub async fn snapshot(&self, target: &CollectionRef) -> Vec<Document> {
        self.collections.read().await.get(target).cloned().unwrap_or_default()
    }
}

/// `_id` first, then the remaining fields in their submitted order
fn with_identity(id: Value, document: Document) -> Document {
    let mut stored = Document::new();
    stored.insert(ID_FIELD.to_string(), id);
    for (key, value) in document {
        if key != ID_FIELD {
            stored.insert(key, value);
        }
    }
    stored
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn find(&self, target: &CollectionRef, query: &Query, options: &FindOptions) -> Result<Vec<Document>, BackendError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(target) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Document> = documents.iter().filter(|d| query.matches(d)).cloned().collect();
        drop(collections);

        options.sort.sort(&mut found);
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, target: &CollectionRef, query: &Query) -> Result<u64, BackendError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(target)
            .map(|documents| documents.iter().filter(|d| query.matches(d)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn save(&self, target: &CollectionRef, document: Document) -> Result<Document, BackendError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(target.clone()).or_default();

        if let Some(id) = identity(&document).cloned() {
            if let Some(existing) = documents.iter_mut().find(|d| identity(d) == Some(&id)) {
                *existing = with_identity(id, document);
                tracing::debug!("Replaced document in {}", target);
                return Ok(existing.clone());
            }
            let stored = with_identity(id, document);
            documents.push(stored.clone());
            return Ok(stored);
        }

        let stored = with_identity(Value::String(Uuid::new_v4().to_string()), document);
        documents.push(stored.clone());
        tracing::debug!("Inserted document into {} ({} total)", target, documents.len());
        Ok(stored)
    }

    async fn update_one(&self, target: &CollectionRef, query: &Query, document: Document) -> Result<WriteResult, BackendError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(target) else {
            return Ok(WriteResult::default());
        };
        let Some(existing) = documents.iter_mut().find(|d| query.matches(d)) else {
            return Ok(WriteResult::default());
        };

        let id = identity(existing)
            .cloned()
            .ok_or_else(|| BackendError::Rejected(format!("stored document in {} has no {}", target, ID_FIELD)))?;
        let replacement = with_identity(id, document);
        let modified = if *existing == replacement { 0 } else { 1 };
        *existing = replacement;

        Ok(WriteResult { matched: 1, modified })
    }

    async fn remove(&self, target: &CollectionRef, query: &Query) -> Result<WriteResult, BackendError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(target) else {
            return Ok(WriteResult::default());
        };

        let before = documents.len();
        documents.retain(|d| !query.matches(d));
        let removed = (before - documents.len()) as u64;

        Ok(WriteResult { matched: removed, modified: removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::into_document;
    use crate::filter::SortSpec;
    use serde_json::json;

    fn target() -> CollectionRef {
        CollectionRef::new("memory://test", "demo", "todos")
    }

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    #[tokio::test]
    async fn save_assigns_identity_first() {
        let store = MemoryStore::new();
        let saved = store.save(&target(), doc(json!({"Title": "a"}))).await.unwrap();

        assert_eq!(saved.keys().next().map(String::as_str), Some(ID_FIELD));
        assert!(Uuid::parse_str(saved[ID_FIELD].as_str().unwrap()).is_ok());
        assert_eq!(store.snapshot(&target()).await.len(), 1);
    }

    #[tokio::test]
    async fn save_with_known_identity_replaces() {
        let store = MemoryStore::new();
        let saved = store.save(&target(), doc(json!({"Title": "a"}))).await.unwrap();
        let mut changed = saved.clone();
        changed.insert("Title".into(), json!("b"));

        store.save(&target(), changed).await.unwrap();
        let all = store.snapshot(&target()).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["Title"], json!("b"));
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = MemoryStore::new();
        store.save(&target(), doc(json!({"Title": "a"}))).await.unwrap();
        let other = CollectionRef::new("memory://test", "other", "todos");
        assert_eq!(store.count(&other, &Query::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = MemoryStore::new();
        for n in [3, 1, 2, 5, 4] {
            store.save(&target(), doc(json!({"n": n}))).await.unwrap();
        }
        let options = FindOptions {
            sort: SortSpec::parse(r#"{"n": -1}"#).unwrap(),
            skip: Some(1),
            limit: Some(2),
        };
        let found = store.find(&target(), &Query::all(), &options).await.unwrap();
        let ns: Vec<Value> = found.iter().map(|d| d["n"].clone()).collect();
        assert_eq!(ns, vec![json!(4), json!(3)]);
    }

    #[tokio::test]
    async fn update_one_reports_matches() {
        let store = MemoryStore::new();
        let saved = store.save(&target(), doc(json!({"Title": "a"}))).await.unwrap();
        let by_id = Query::eq(ID_FIELD, saved[ID_FIELD].clone());

        let result = store.update_one(&target(), &by_id, doc(json!({"Title": "b"}))).await.unwrap();
        assert_eq!(result, WriteResult { matched: 1, modified: 1 });

        let result = store.update_one(&target(), &by_id, doc(json!({"Title": "b"}))).await.unwrap();
        assert_eq!(result, WriteResult { matched: 1, modified: 0 });

        let missing = Query::eq(ID_FIELD, json!("nope"));
        let result = store.update_one(&target(), &missing, doc(json!({"Title": "c"}))).await.unwrap();
        assert_eq!(result, WriteResult::default());
    }

    #[tokio::test]
    async fn remove_deletes_every_match() {
        let store = MemoryStore::new();
        for owner in ["alice", "bob", "alice"] {
            store.save(&target(), doc(json!({"Username": owner}))).await.unwrap();
        }
        let result = store.remove(&target(), &Query::eq("Username", json!("alice"))).await.unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(store.count(&target(), &Query::all()).await.unwrap(), 1);
    }
}
