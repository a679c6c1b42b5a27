use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    change_stream::event::ChangeStreamEvent,
    error::Error as MongoError,
    options::{FullDocumentBeforeChangeType, FullDocumentType, IndexOptions},
};
use serde_json::Value;
use tokio::{
    sync::{RwLock, broadcast},
    time::sleep,
};
use tracing::{debug, info, warn};

use super::{
    config::MongoConfig,
    connection::{backoff, establish_connection},
    error::{MongoDaoError, MongoResult, is_duplicate_key, is_namespace_exists, is_transient},
    models::{MongoCollectionCounter, MongoDocument, doc_id},
};
use crate::dao::{
    document_store::{
        CHANGE_CHANNEL_CAPACITY, ChangeEvent, DocumentStore, FilterValue, Query, StoreTransaction,
        StoredDocument, Write,
    },
    paths::{self, CollectionPath, DocPath},
    storage::{StorageError, StorageResult},
};

/// Post-images must be the exact result of each write, not a later lookup.
const POST_IMAGE: FullDocumentType = FullDocumentType::Required;
/// Collection holding the membership counters used to guard list reads.
const COUNTERS_COLLECTION: &str = "_collections";
/// One MongoDB collection per leaf collection name.
const DOCUMENT_COLLECTIONS: [&str; 7] = [
    paths::GAMES,
    paths::PLAYERS,
    paths::ROUNDS,
    paths::RANKINGS,
    paths::SCORES,
    paths::CHALLENGES,
    paths::SESSIONS,
];

/// Document store backed by a MongoDB replica set.
#[derive(Clone)]
pub struct MongoDocumentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    changes: broadcast::Sender<ChangeEvent>,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn handles(&self) -> (Client, Database) {
        let guard = self.state.read().await;
        (guard.client.clone(), guard.database.clone())
    }

    async fn ping(&self) -> MongoResult<()> {
        let (_, database) = self.handles().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    /// Forward database change streams into the broadcast channel until the store is dropped.
    fn spawn_change_feed(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match inner.pump_changes().await {
                    Ok(()) => attempt = 0,
                    Err(err) => {
                        attempt += 1;
                        warn!(attempt, error = %err, "MongoDB change stream interrupted; restarting");
                    }
                }
                drop(inner);
                sleep(backoff(attempt.max(1))).await;
            }
        });
    }

    async fn pump_changes(&self) -> MongoResult<()> {
        let (_, database) = self.handles().await;
        let mut stream = database
            .watch()
            .full_document(POST_IMAGE)
            .full_document_before_change(FullDocumentBeforeChangeType::WhenAvailable)
            .await
            .map_err(|source| MongoDaoError::Watch { source })?
            .with_type::<ChangeStreamEvent<MongoDocument>>();

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|source| MongoDaoError::Watch { source })?
        {
            let collection = event.ns.as_ref().and_then(|ns| ns.coll.as_deref());
            if collection == Some(COUNTERS_COLLECTION) {
                continue;
            }
            if let Some(change) =
                change_event(event.full_document_before_change, event.full_document)
            {
                let _ = self.changes.send(change);
            }
        }

        Ok(())
    }
}

impl MongoDocumentStore {
    /// Connect, prepare collections and start the change feed.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
            changes,
        });

        let store = Self { inner };
        store.ensure_collections().await?;
        MongoInner::spawn_change_feed(&store.inner);
        info!("MongoDB document store ready");
        Ok(store)
    }

    async fn ensure_collections(&self) -> MongoResult<()> {
        let (_, database) = self.inner.handles().await;
        for name in DOCUMENT_COLLECTIONS {
            if let Err(source) = database.create_collection(name).await {
                if !is_namespace_exists(&source) {
                    return Err(MongoDaoError::EnsureCollection {
                        collection: name,
                        source,
                    });
                }
            }

            database
                .run_command(doc! {
                    "collMod": name,
                    "changeStreamPreAndPostImages": { "enabled": true },
                })
                .await
                .map_err(|source| MongoDaoError::EnsureCollection {
                    collection: name,
                    source,
                })?;

            let index = IndexModel::builder()
                .keys(doc! { "parent": 1 })
                .options(
                    IndexOptions::builder()
                        .name(Some("parent_idx".to_owned()))
                        .build(),
                )
                .build();
            database
                .collection::<MongoDocument>(name)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: name,
                    index: "parent",
                    source,
                })?;
        }
        Ok(())
    }

    fn documents(database: &Database, collection: &CollectionPath) -> Collection<MongoDocument> {
        database.collection::<MongoDocument>(collection.name())
    }

    fn counters(database: &Database) -> Collection<MongoCollectionCounter> {
        database.collection::<MongoCollectionCounter>(COUNTERS_COLLECTION)
    }

    async fn find(&self, path: &DocPath) -> StorageResult<Option<MongoDocument>> {
        let (_, database) = self.inner.handles().await;
        Self::documents(&database, &path.parent())
            .find_one(doc_id(path.as_str()))
            .await
            .map_err(|source| read_error(path.as_str(), source))
    }

    async fn counter(&self, collection: &CollectionPath) -> StorageResult<i64> {
        let (_, database) = self.inner.handles().await;
        let counter = Self::counters(&database)
            .find_one(doc_id(collection.as_str()))
            .await
            .map_err(|source| read_error(collection.as_str(), source))?;
        Ok(counter.map(|counter| counter.version).unwrap_or(0))
    }

    async fn find_many(
        &self,
        collection: &CollectionPath,
        filter: Document,
        sort: Document,
        skip: usize,
        limit: Option<usize>,
    ) -> StorageResult<Vec<MongoDocument>> {
        let (_, database) = self.inner.handles().await;
        let query_error = |source| {
            StorageError::from(MongoDaoError::Query {
                collection: collection.to_string(),
                source,
            })
        };
        let documents = Self::documents(&database, collection);
        let mut find = documents.find(filter).sort(sort);
        if skip > 0 {
            find = find.skip(u64::try_from(skip).unwrap_or(u64::MAX));
        }
        if let Some(limit) = limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        find.await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)
    }

    async fn list_documents(&self, collection: &CollectionPath) -> StorageResult<Vec<MongoDocument>> {
        self.find_many(
            collection,
            doc! { "parent": collection.as_str() },
            doc! { "_id": 1 },
            0,
            None,
        )
        .await
    }

    async fn run_query(&self, query: Query) -> StorageResult<Vec<StoredDocument>> {
        let mut filter = doc! { "parent": query.collection.as_str() };
        for (field, value) in &query.filters {
            filter.insert(format!("data.{field}"), filter_bson(value));
        }
        let mut sort = Document::new();
        if let Some(field) = &query.order_by {
            sort.insert(format!("data.{field}"), 1);
        }
        sort.insert("_id", 1);

        let documents = self
            .find_many(&query.collection, filter, sort, query.offset, query.limit)
            .await?;
        Ok(documents.into_iter().filter_map(stored).collect())
    }

    /// Validate the read set and apply the writes inside one server-side transaction.
    async fn commit_guarded(
        &self,
        reads: HashMap<DocPath, Option<i64>>,
        counters: HashMap<CollectionPath, i64>,
        writes: Vec<Write>,
    ) -> StorageResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let (client, database) = self.inner.handles().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;

        let applied = apply_in_session(&database, &mut session, reads, counters, writes).await;
        match applied {
            Ok(()) => session.commit_transaction().await.map_err(|source| {
                if is_transient(&source) {
                    StorageError::Conflict {
                        path: "transaction".into(),
                    }
                } else {
                    MongoDaoError::CommitTransaction { source }.into()
                }
            }),
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    debug!(error = %abort_err, "failed to abort MongoDB transaction");
                }
                Err(err)
            }
        }
    }
}

async fn apply_in_session(
    database: &Database,
    session: &mut ClientSession,
    reads: HashMap<DocPath, Option<i64>>,
    counters: HashMap<CollectionPath, i64>,
    writes: Vec<Write>,
) -> StorageResult<()> {
    for (path, expected) in &reads {
        let current = MongoDocumentStore::documents(database, &path.parent())
            .find_one(doc_id(path.as_str()))
            .session(&mut *session)
            .await
            .map_err(|source| read_error(path.as_str(), source))?;
        if current.map(|doc| doc.version) != *expected {
            return Err(StorageError::Conflict {
                path: path.to_string(),
            });
        }
    }

    for (collection, expected) in &counters {
        let current = MongoDocumentStore::counters(database)
            .find_one(doc_id(collection.as_str()))
            .session(&mut *session)
            .await
            .map_err(|source| read_error(collection.as_str(), source))?;
        if current.map(|counter| counter.version).unwrap_or(0) != *expected {
            return Err(StorageError::Conflict {
                path: collection.to_string(),
            });
        }
    }

    // Final content per document, keeping the version it was loaded with.
    let mut pending: HashMap<DocPath, (Option<i64>, Option<Value>)> = HashMap::new();
    let mut order: Vec<DocPath> = Vec::new();
    for write in &writes {
        let path = write.path();
        if !pending.contains_key(path) {
            let current = MongoDocumentStore::documents(database, &path.parent())
                .find_one(doc_id(path.as_str()))
                .session(&mut *session)
                .await
                .map_err(|source| read_error(path.as_str(), source))?;
            let loaded = match current {
                Some(doc) => (Some(doc.version), Some(doc.data)),
                None => (None, None),
            };
            pending.insert(path.clone(), loaded);
            order.push(path.clone());
        }
        if let Some((_, data)) = pending.get_mut(path) {
            *data = Some(write.apply_to(data.as_ref())?);
        }
    }

    for path in order {
        let Some((version, Some(data))) = pending.remove(&path) else {
            continue;
        };
        let parent = path.parent();
        let collection = MongoDocumentStore::documents(database, &parent);
        let document = MongoDocument {
            id: path.to_string(),
            parent: parent.to_string(),
            version: version.unwrap_or(0) + 1,
            data,
        };

        match version {
            Some(version) => {
                let result = collection
                    .replace_one(doc! { "_id": path.as_str(), "version": version }, &document)
                    .session(&mut *session)
                    .await
                    .map_err(|source| write_error(&path, source))?;
                if result.matched_count == 0 {
                    return Err(StorageError::Conflict {
                        path: path.to_string(),
                    });
                }
            }
            None => {
                collection
                    .insert_one(&document)
                    .session(&mut *session)
                    .await
                    .map_err(|source| write_error(&path, source))?;
                MongoDocumentStore::counters(database)
                    .update_one(
                        doc_id(parent.as_str()),
                        doc! { "$inc": { "version": 1_i64 } },
                    )
                    .upsert(true)
                    .session(&mut *session)
                    .await
                    .map_err(|source| write_error(&path, source))?;
            }
        }
    }

    Ok(())
}

/// Store change built from the pre- and post-image of one change stream event.
fn change_event(
    before: Option<MongoDocument>,
    after: Option<MongoDocument>,
) -> Option<ChangeEvent> {
    let raw_path = after.as_ref().or(before.as_ref()).map(|doc| doc.id.clone())?;
    let path = DocPath::parse(&raw_path)?;
    let before = before.map(|doc| doc.data);
    let after = after.map(|doc| doc.data);
    if before == after {
        return None;
    }
    Some(ChangeEvent {
        path,
        before,
        after,
    })
}

fn filter_bson(value: &FilterValue) -> Bson {
    match value {
        FilterValue::Str(value) => Bson::String(value.clone()),
        FilterValue::Int(value) => Bson::Int64(*value),
        FilterValue::Bool(value) => Bson::Boolean(*value),
    }
}

/// Documents whose `_id` is not a valid path are not ours and are skipped.
fn stored(document: MongoDocument) -> Option<StoredDocument> {
    let path = DocPath::parse(&document.id)?;
    Some(StoredDocument {
        path,
        data: document.data,
    })
}

fn read_error(path: &str, source: MongoError) -> StorageError {
    if is_transient(&source) {
        return StorageError::Conflict {
            path: path.to_owned(),
        };
    }
    MongoDaoError::Read {
        path: path.to_owned(),
        source,
    }
    .into()
}

fn write_error(path: &DocPath, source: MongoError) -> StorageError {
    // A concurrent insert of the same document surfaces as a duplicate key.
    if is_transient(&source) || is_duplicate_key(&source) {
        return StorageError::Conflict {
            path: path.to_string(),
        };
    }
    MongoDaoError::Write {
        path: path.to_string(),
        source,
    }
    .into()
}

/// Tracks versions read outside the server transaction; validated at commit.
struct MongoTransaction {
    store: MongoDocumentStore,
    reads: HashMap<DocPath, Option<i64>>,
    counters: HashMap<CollectionPath, i64>,
    staged: Vec<Write>,
}

impl MongoTransaction {
    fn overlay(&self, path: &DocPath, base: Option<Value>) -> StorageResult<Option<Value>> {
        let mut current = base;
        for write in self.staged.iter().filter(|write| write.path() == path) {
            current = Some(write.apply_to(current.as_ref())?);
        }
        Ok(current)
    }
}

impl StoreTransaction for MongoTransaction {
    fn get<'a>(&'a mut self, path: &'a DocPath) -> BoxFuture<'a, StorageResult<Option<Value>>> {
        Box::pin(async move {
            let current = self.store.find(path).await?;
            let version = current.as_ref().map(|doc| doc.version);
            self.reads.entry(path.clone()).or_insert(version);
            self.overlay(path, current.map(|doc| doc.data))
        })
    }

    fn list<'a>(
        &'a mut self,
        collection: &'a CollectionPath,
    ) -> BoxFuture<'a, StorageResult<Vec<StoredDocument>>> {
        Box::pin(async move {
            let counter = self.store.counter(collection).await?;
            self.counters.entry(collection.clone()).or_insert(counter);

            let mut docs: BTreeMap<DocPath, Value> = BTreeMap::new();
            for document in self.store.list_documents(collection).await? {
                let version = document.version;
                let Some(stored) = stored(document) else {
                    continue;
                };
                self.reads.entry(stored.path.clone()).or_insert(Some(version));
                docs.insert(stored.path, stored.data);
            }
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
            let MongoTransaction {
                store,
                reads,
                counters,
                staged,
            } = *self;
            store.commit_guarded(reads, counters, staged).await
        })
    }
}

impl DocumentStore for MongoDocumentStore {
    fn get(&self, path: DocPath) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find(&path).await?.map(|doc| doc.data)) })
    }

    fn list(
        &self,
        collection: CollectionPath,
    ) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .list_documents(&collection)
                .await?
                .into_iter()
                .filter_map(stored)
                .collect())
        })
    }

    fn query(&self, query: Query) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let store = self.clone();
        Box::pin(async move { store.run_query(query).await })
    }

    fn commit(&self, writes: Vec<Write>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_guarded(HashMap::new(), HashMap::new(), writes)
                .await
        })
    }

    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>> {
        let store = self.clone();
        Box::pin(async move {
            let tx: Box<dyn StoreTransaction> = Box::new(MongoTransaction {
                store,
                reads: HashMap::new(),
                counters: HashMap::new(),
                staged: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn round_image(version: i64, status: &str) -> MongoDocument {
        MongoDocument {
            id: "games/G/rounds/1".into(),
            parent: "games/G/rounds".into(),
            version,
            data: json!({ "status": status }),
        }
    }

    #[test]
    fn watches_exact_post_images() {
        assert!(matches!(POST_IMAGE, FullDocumentType::Required));
    }

    #[test]
    fn change_carries_the_images_of_its_own_write() {
        let change = change_event(
            Some(round_image(3, "ranking")),
            Some(round_image(4, "scoring")),
        )
        .unwrap();
        assert_eq!(change.path, paths::round("G", 1));
        assert_eq!(change.before_field("status"), Some(&json!("ranking")));
        assert_eq!(change.after_field("status"), Some(&json!("scoring")));
    }

    #[test]
    fn unchanged_and_foreign_documents_are_skipped() {
        let same = change_event(Some(round_image(1, "ranking")), Some(round_image(2, "ranking")));
        assert!(same.is_none());
        let foreign = MongoDocument {
            id: "not-a-path".into(),
            parent: String::new(),
            version: 1,
            data: json!({}),
        };
        assert!(change_event(None, Some(foreign)).is_none());
    }
}
