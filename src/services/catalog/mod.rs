//! Music catalog provider consumed for track search and challenge seeding.

#[cfg(feature = "deezer-catalog")]
mod deezer;
mod static_catalog;

#[cfg(feature = "deezer-catalog")]
pub use deezer::DeezerCatalog;
pub use static_catalog::StaticCatalog;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Track returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable catalog identifier, used as the song key in rankings.
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    pub preview_url: Option<String>,
    pub explicit: bool,
}

/// Failures raised by catalog providers.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to build catalog client")]
    ClientBuilder {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("catalog request for `{query}` failed")]
    Request {
        query: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("catalog answered `{query}` with status {status}")]
    Status { query: String, status: u16 },
}

/// Search capability over an external music catalog.
pub trait MusicCatalog: Send + Sync {
    /// Search tracks, dropping explicit ones unless `allow_explicit`.
    fn search_tracks(
        &self,
        query: &str,
        allow_explicit: bool,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<Track>, CatalogError>>;
}
