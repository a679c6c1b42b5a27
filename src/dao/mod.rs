/// Backend-neutral document store and its implementations.
pub mod document_store;
/// Database model definitions.
pub mod models;
/// Document addresses of the persisted layout.
pub mod paths;
/// Typed Store Access Layer used by the services.
pub mod repository;
/// Storage abstraction layer errors.
pub mod storage;
