use mongodb::error::{Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;
const NAMESPACE_EXISTS_CODE: i32 = 48;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to prepare collection `{collection}`")]
    EnsureCollection {
        collection: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to open a MongoDB transaction")]
    StartTransaction {
        #[source]
        source: MongoError,
    },
    #[error("failed to commit MongoDB transaction")]
    CommitTransaction {
        #[source]
        source: MongoError,
    },
    #[error("failed to read `{path}`")]
    Read {
        path: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write `{path}`")]
    Write {
        path: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query collection `{collection}`")]
    Query {
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to watch database changes")]
    Watch {
        #[source]
        source: MongoError,
    },
}

/// Whether the server asks for the whole transaction to be replayed.
pub fn is_transient(err: &MongoError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref failure)) if failure.code == DUPLICATE_KEY_CODE
    )
}

pub fn is_namespace_exists(err: &MongoError) -> bool {
    matches!(*err.kind, ErrorKind::Command(ref command) if command.code == NAMESPACE_EXISTS_CODE)
}
