use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;

use super::{CatalogError, MusicCatalog, Track};

/// Deezer public search API.
#[derive(Clone)]
pub struct DeezerCatalog {
    client: Client,
    base_url: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<DeezerTrack>,
}

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    id: u64,
    title: String,
    #[serde(default)]
    preview: Option<String>,
    #[serde(default)]
    explicit_lyrics: bool,
    artist: DeezerArtist,
    #[serde(default)]
    album: Option<DeezerAlbum>,
}

#[derive(Debug, Deserialize)]
struct DeezerArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeezerAlbum {
    title: String,
}

impl From<DeezerTrack> for Track {
    fn from(value: DeezerTrack) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.title,
            artist: value.artist.name,
            album: value.album.map(|album| album.title),
            // Deezer returns an empty string when no preview exists.
            preview_url: value.preview.filter(|url| !url.is_empty()),
            explicit: value.explicit_lyrics,
        }
    }
}

impl DeezerCatalog {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .build()
            .map_err(|source| CatalogError::ClientBuilder {
                source: Box::new(source),
            })?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    async fn search(
        &self,
        query: String,
        allow_explicit: bool,
        limit: usize,
    ) -> Result<Vec<Track>, CatalogError> {
        let url = format!("{}/search", self.base_url);
        let request_error = |source: reqwest::Error| CatalogError::Request {
            query: query.clone(),
            source: Box::new(source),
        };

        // Explicit tracks are filtered client side, after fetching twice the page.
        let fetch = (if allow_explicit { limit } else { limit * 2 }).to_string();
        let response = self
            .client
            .get(url)
            .query(&[("q", query.as_str()), ("limit", fetch.as_str())])
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(CatalogError::Status {
                query,
                status: response.status().as_u16(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(request_error)?;
        Ok(body
            .data
            .into_iter()
            .map(Track::from)
            .filter(|track| allow_explicit || !track.explicit)
            .take(limit)
            .collect())
    }
}

impl MusicCatalog for DeezerCatalog {
    fn search_tracks(
        &self,
        query: &str,
        allow_explicit: bool,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<Track>, CatalogError>> {
        let catalog = self.clone();
        let query = query.to_owned();
        Box::pin(async move { catalog.search(query, allow_explicit, limit).await })
    }
}
