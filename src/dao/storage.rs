use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The read set of a transaction was invalidated by a concurrent commit.
    #[error("transaction conflict on `{path}`")]
    Conflict { path: String },
    /// A `Create` write targeted a document that already exists.
    #[error("document `{path}` already exists")]
    AlreadyExists { path: String },
    /// An `Update` or `Increment` write targeted a missing document.
    #[error("document `{path}` does not exist")]
    Missing { path: String },
    /// A model could not be turned into a storable document.
    #[error("failed to encode document `{path}`")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// The transaction handle was used after it committed.
    #[error("transaction already finished")]
    TransactionClosed,
    /// A stored document could not be mapped onto the expected model.
    #[error("failed to decode document `{path}`")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether replaying the whole transaction may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
