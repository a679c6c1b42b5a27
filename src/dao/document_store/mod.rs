//! Backend-neutral document store with optimistic transactions and change
//! notifications.

/// In-process backend implementing the full optimistic-concurrency contract.
pub mod memory;
/// MongoDB backend using replica-set transactions and change streams.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::dao::{
    paths::{CollectionPath, DocPath},
    storage::{StorageError, StorageResult},
};

/// Number of times a conflicting transaction is replayed before giving up.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;
/// Capacity of the change broadcast channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A mutation applied atomically as part of a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Insert a new document, failing when it already exists.
    Create { path: DocPath, data: Value },
    /// Replace or insert the document.
    Set { path: DocPath, data: Value },
    /// Merge top-level fields into an existing document.
    Update {
        path: DocPath,
        fields: Map<String, Value>,
    },
    /// Add `by` to a numeric top-level field of an existing document.
    Increment {
        path: DocPath,
        field: String,
        by: i64,
    },
}

impl Write {
    /// Document touched by the write.
    pub fn path(&self) -> &DocPath {
        match self {
            Write::Create { path, .. }
            | Write::Set { path, .. }
            | Write::Update { path, .. }
            | Write::Increment { path, .. } => path,
        }
    }

    /// Whether applying the write may add a member to the parent collection.
    pub fn may_insert(&self) -> bool {
        matches!(self, Write::Create { .. } | Write::Set { .. })
    }

    /// Compute the document produced by applying this write on top of `current`.
    pub fn apply_to(&self, current: Option<&Value>) -> StorageResult<Value> {
        match (self, current) {
            (Write::Create { path, .. }, Some(_)) => Err(StorageError::AlreadyExists {
                path: path.to_string(),
            }),
            (Write::Create { data, .. }, None) | (Write::Set { data, .. }, _) => Ok(data.clone()),
            (Write::Update { path, .. } | Write::Increment { path, .. }, None) => {
                Err(StorageError::Missing {
                    path: path.to_string(),
                })
            }
            (Write::Update { fields, .. }, Some(current)) => {
                let mut merged = current.as_object().cloned().unwrap_or_default();
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(merged))
            }
            (Write::Increment { field, by, .. }, Some(current)) => {
                let mut merged = current.as_object().cloned().unwrap_or_default();
                let previous = merged.get(field).and_then(Value::as_i64).unwrap_or(0);
                merged.insert(field.clone(), Value::from(previous + by));
                Ok(Value::Object(merged))
            }
        }
    }
}

/// A document together with its address.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub path: DocPath,
    pub data: Value,
}

/// Notification published for every committed write, in commit order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: DocPath,
    /// Document before the write, `None` when it was created.
    pub before: Option<Value>,
    /// Document after the write.
    pub after: Option<Value>,
}

impl ChangeEvent {
    /// Top-level field of the previous document.
    pub fn before_field(&self, field: &str) -> Option<&Value> {
        self.before.as_ref().and_then(|doc| doc.get(field))
    }

    /// Top-level field of the new document.
    pub fn after_field(&self, field: &str) -> Option<&Value> {
        self.after.as_ref().and_then(|doc| doc.get(field))
    }
}

/// Scalar used in equality filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FilterValue {
    /// Whether a stored JSON value equals this filter value.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (FilterValue::Str(expected), Some(Value::String(actual))) => expected == actual,
            (FilterValue::Int(expected), Some(actual)) => actual.as_i64() == Some(*expected),
            (FilterValue::Bool(expected), Some(Value::Bool(actual))) => expected == actual,
            _ => false,
        }
    }
}

/// Equality query over the documents of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<(String, FilterValue)>,
    /// Ascending order on a top-level field.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    /// Matches skipped after ordering, for paging.
    pub offset: usize,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn where_eq(mut self, field: &str, value: FilterValue) -> Self {
        self.filters.push((field.to_owned(), value));
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_owned());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether a document satisfies every filter.
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| expected.matches(data.get(field)))
    }
}

/// Persistence capability shared by every backend.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: DocPath) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn list(&self, collection: CollectionPath)
    -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>>;
    fn query(&self, query: Query) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>>;
    /// Apply every write atomically, without read-set validation.
    fn commit(&self, writes: Vec<Write>) -> BoxFuture<'static, StorageResult<()>>;
    /// Open an optimistic transaction.
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>>;
    /// Receive every change committed after the call.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Optimistic transaction: reads are tracked, writes are staged until commit.
///
/// Reads observe the writes already staged in the same transaction. Commit
/// fails with [`StorageError::Conflict`] when a document or collection read by
/// the transaction changed in between.
pub trait StoreTransaction: Send {
    fn get<'a>(&'a mut self, path: &'a DocPath) -> BoxFuture<'a, StorageResult<Option<Value>>>;
    fn list<'a>(
        &'a mut self,
        collection: &'a CollectionPath,
    ) -> BoxFuture<'a, StorageResult<Vec<StoredDocument>>>;
    fn stage(&mut self, write: Write);
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}

/// Cloneable handle over an open [`StoreTransaction`].
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Mutex<Option<Box<dyn StoreTransaction>>>>,
}

impl Transaction {
    pub fn new(inner: Box<dyn StoreTransaction>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(inner))),
        }
    }

    pub async fn get(&self, path: &DocPath) -> StorageResult<Option<Value>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StorageError::TransactionClosed)?;
        tx.get(path).await
    }

    pub async fn list(&self, collection: &CollectionPath) -> StorageResult<Vec<StoredDocument>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StorageError::TransactionClosed)?;
        tx.list(collection).await
    }

    pub async fn stage(&self, write: Write) -> StorageResult<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StorageError::TransactionClosed)?;
        tx.stage(write);
        Ok(())
    }

    /// Commit the staged writes; the handle is unusable afterwards.
    pub async fn commit(&self) -> StorageResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(StorageError::TransactionClosed)?;
        tx.commit().await
    }
}

/// Run `op` inside a fresh transaction and commit it, replaying the whole
/// operation when the commit reports a conflict.
///
/// Business errors returned by `op` abort the attempt without committing.
pub async fn run_in_transaction<T, E, F, Fut>(
    store: &Arc<dyn DocumentStore>,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StorageError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let tx = Transaction::new(store.begin().await?);
        let value = op(tx.clone()).await?;

        match tx.commit().await {
            Ok(()) => return Ok(value),
            Err(err) if err.is_conflict() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                let wait = retry_delay(attempt);
                debug!(attempt, error = %err, wait_ms = wait.as_millis(), "transaction conflict; replaying");
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let jitter = rand::rng().random_range(0..10);
    Duration::from_millis(5 * u64::from(attempt) + jitter)
}
