use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::{
    CHANGE_CHANNEL_CAPACITY, ChangeEvent, DocumentStore, Query, StoreTransaction, StoredDocument,
    Write,
};
use crate::dao::{
    paths::{CollectionPath, DocPath},
    storage::{StorageError, StorageResult},
};

/// Volatile store used for development and tests.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    state: RwLock<MemoryState>,
    changes: broadcast::Sender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<DocPath, Versioned>,
    /// Bumped whenever a document is added to the collection.
    collections: HashMap<CollectionPath, u64>,
    clock: u64,
}

struct Versioned {
    version: u64,
    data: Value,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                state: RwLock::new(MemoryState::default()),
                changes,
            }),
        }
    }
}

impl MemoryState {
    fn version_of(&self, path: &DocPath) -> u64 {
        self.docs.get(path).map(|doc| doc.version).unwrap_or(0)
    }

    fn collection_version(&self, collection: &CollectionPath) -> u64 {
        self.collections.get(collection).copied().unwrap_or(0)
    }

    fn members(&self, collection: &CollectionPath) -> Vec<StoredDocument> {
        self.docs
            .iter()
            .filter(|(path, _)| path.parent() == *collection)
            .map(|(path, doc)| StoredDocument {
                path: path.clone(),
                data: doc.data.clone(),
            })
            .collect()
    }

    /// Apply the writes all-or-nothing and return the resulting change events.
    fn apply(&mut self, writes: Vec<Write>) -> StorageResult<Vec<ChangeEvent>> {
        let mut pending: HashMap<DocPath, Option<Value>> = HashMap::new();
        let mut events = Vec::with_capacity(writes.len());

        for write in &writes {
            let path = write.path();
            let before = match pending.get(path) {
                Some(staged) => staged.clone(),
                None => self.docs.get(path).map(|doc| doc.data.clone()),
            };
            let after = write.apply_to(before.as_ref())?;
            pending.insert(path.clone(), Some(after.clone()));
            events.push(ChangeEvent {
                path: path.clone(),
                before,
                after: Some(after),
            });
        }

        for (path, data) in pending {
            let Some(data) = data else { continue };
            self.clock += 1;
            let version = self.clock;
            if !self.docs.contains_key(&path) {
                self.collections.insert(path.parent(), version);
            }
            self.docs.insert(path, Versioned { version, data });
        }

        Ok(events)
    }
}

impl MemoryInner {
    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // No subscriber is not an error.
            let _ = self.changes.send(event);
        }
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a), Some(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: DocPath) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            Ok(state.docs.get(&path).map(|doc| doc.data.clone()))
        })
    }

    fn list(
        &self,
        collection: CollectionPath,
    ) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            Ok(state.members(&collection))
        })
    }

    fn query(&self, query: Query) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            let mut matches: Vec<StoredDocument> = state
                .members(&query.collection)
                .into_iter()
                .filter(|doc| query.matches(&doc.data))
                .collect();
            if let Some(field) = &query.order_by {
                matches.sort_by(|a, b| compare_field(&a.data, &b.data, field));
            }
            matches.drain(..query.offset.min(matches.len()));
            if let Some(limit) = query.limit {
                matches.truncate(limit);
            }
            Ok(matches)
        })
    }

    fn commit(&self, writes: Vec<Write>) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let events = {
                let mut state = inner.state.write().await;
                state.apply(writes)?
            };
            inner.publish(events);
            Ok(())
        })
    }

    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tx: Box<dyn StoreTransaction> = Box::new(MemoryTransaction {
                inner,
                reads: HashMap::new(),
                collection_reads: HashMap::new(),
                staged: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    /// Version observed for each document read (0 when absent).
    reads: HashMap<DocPath, u64>,
    collection_reads: HashMap<CollectionPath, u64>,
    staged: Vec<Write>,
}

impl MemoryTransaction {
    fn overlay(&self, path: &DocPath, base: Option<Value>) -> StorageResult<Option<Value>> {
        let mut current = base;
        for write in self.staged.iter().filter(|write| write.path() == path) {
            current = Some(write.apply_to(current.as_ref())?);
        }
        Ok(current)
    }
}

impl StoreTransaction for MemoryTransaction {
    fn get<'a>(&'a mut self, path: &'a DocPath) -> BoxFuture<'a, StorageResult<Option<Value>>> {
        Box::pin(async move {
            let base = {
                let state = self.inner.state.read().await;
                self.reads
                    .entry(path.clone())
                    .or_insert_with(|| state.version_of(path));
                state.docs.get(path).map(|doc| doc.data.clone())
            };
            self.overlay(path, base)
        })
    }

    fn list<'a>(
        &'a mut self,
        collection: &'a CollectionPath,
    ) -> BoxFuture<'a, StorageResult<Vec<StoredDocument>>> {
        Box::pin(async move {
            let members = {
                let state = self.inner.state.read().await;
                self.collection_reads
                    .entry(collection.clone())
                    .or_insert_with(|| state.collection_version(collection));
                for doc in state.members(collection) {
                    self.reads
                        .entry(doc.path.clone())
                        .or_insert_with(|| state.version_of(&doc.path));
                }
                state.members(collection)
            };

            let mut docs: BTreeMap<DocPath, Value> = members
                .into_iter()
                .map(|doc| (doc.path, doc.data))
                .collect();
            for write in &self.staged {
                let path = write.path();
                if path.parent() != *collection {
                    continue;
                }
                let updated = write.apply_to(docs.get(path))?;
                docs.insert(path.clone(), updated);
            }

            Ok(docs
                .into_iter()
                .map(|(path, data)| StoredDocument { path, data })
                .collect())
        })
    }

    fn stage(&mut self, write: Write) {
        self.staged.push(write);
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            let MemoryTransaction {
                inner,
                reads,
                collection_reads,
                staged,
            } = *self;

            let events = {
                let mut state = inner.state.write().await;
                if let Some((path, _)) = reads
                    .iter()
                    .find(|(path, version)| state.version_of(path) != **version)
                {
                    return Err(StorageError::Conflict {
                        path: path.to_string(),
                    });
                }
                if let Some((collection, _)) = collection_reads
                    .iter()
                    .find(|(collection, version)| state.collection_version(collection) != **version)
                {
                    return Err(StorageError::Conflict {
                        path: collection.to_string(),
                    });
                }
                state.apply(staged)?
            };

            inner.publish(events);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::{document_store::FilterValue, paths};

    fn set(path: DocPath, data: Value) -> Write {
        Write::Set { path, data }
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let path = paths::player("G", "p1");
        tx.stage(set(path.clone(), json!({"score": 1})));
        tx.stage(Write::Increment {
            path: path.clone(),
            field: "score".into(),
            by: 2,
        });

        assert_eq!(tx.get(&path).await.unwrap(), Some(json!({"score": 3})));
        let listed = tx.list(&paths::players("G")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.get(path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_creates_in_listed_collection_conflict() {
        let store = MemoryStore::new();
        let rankings = paths::rankings("G", 1);

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.list(&rankings).await.unwrap().is_empty());
        assert!(second.list(&rankings).await.unwrap().is_empty());
        first.stage(Write::Create {
            path: rankings.doc("a"),
            data: json!({}),
        });
        second.stage(Write::Create {
            path: rankings.doc("b"),
            data: json!({}),
        });

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.list(rankings).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updated_read_set_conflicts() {
        let store = MemoryStore::new();
        let path = paths::game("G");
        store.commit(vec![set(path.clone(), json!({"v": 1}))]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.get(&path).await.unwrap();
        store.commit(vec![set(path.clone(), json!({"v": 2}))]).await.unwrap();
        tx.stage(set(paths::game("H"), json!({})));

        assert!(tx.commit().await.unwrap_err().is_conflict());
        assert_eq!(store.get(paths::game("H")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let result = store
            .commit(vec![
                set(paths::game("G"), json!({})),
                Write::Update {
                    path: paths::game("missing"),
                    fields: Default::default(),
                },
            ])
            .await;

        assert!(matches!(result, Err(StorageError::Missing { .. })));
        assert_eq!(store.get(paths::game("G")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn publishes_changes_in_commit_order() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe();
        let path = paths::round("G", 1);
        store
            .commit(vec![set(path.clone(), json!({"status": "ranking"}))])
            .await
            .unwrap();
        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), json!("scoring"));
        store
            .commit(vec![Write::Update {
                path: path.clone(),
                fields,
            }])
            .await
            .unwrap();

        let created = changes.recv().await.unwrap();
        assert_eq!(created.before, None);
        let updated = changes.recv().await.unwrap();
        assert_eq!(updated.before_field("status"), Some(&json!("ranking")));
        assert_eq!(updated.after_field("status"), Some(&json!("scoring")));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        store
            .commit(vec![
                set(paths::game("B"), json!({"status": "waiting", "createdAt": 20})),
                set(paths::game("A"), json!({"status": "waiting", "createdAt": 10})),
                set(paths::game("C"), json!({"status": "finished", "createdAt": 5})),
            ])
            .await
            .unwrap();

        let found = store
            .query(
                Query::new(CollectionPath::root(paths::GAMES))
                    .where_eq("status", FilterValue::Str("waiting".into()))
                    .order_by("createdAt")
                    .limit(1),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, paths::game("A"));

        let next_page = store
            .query(
                Query::new(CollectionPath::root(paths::GAMES))
                    .where_eq("status", FilterValue::Str("waiting".into()))
                    .order_by("createdAt")
                    .offset(1)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(next_page.len(), 1);
        assert_eq!(next_page[0].path, paths::game("B"));
    }
}
