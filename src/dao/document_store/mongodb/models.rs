use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

/// Envelope persisted for every document; `_id` is the full slash path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDocument {
    #[serde(rename = "_id")]
    pub id: String,
    /// Path of the owning collection, used for listing.
    pub parent: String,
    /// Incremented on every write; guards optimistic commits.
    pub version: i64,
    pub data: serde_json::Value,
}

/// Membership counter of one collection path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCollectionCounter {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
}

pub fn doc_id(id: &str) -> Document {
    doc! { "_id": id }
}
