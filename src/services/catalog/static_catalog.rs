use futures::future::BoxFuture;

use super::{CatalogError, MusicCatalog, Track};

/// Catalog over a fixed track list, matching on name or artist.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tracks: Vec<Track>,
}

impl StaticCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

impl MusicCatalog for StaticCatalog {
    fn search_tracks(
        &self,
        query: &str,
        allow_explicit: bool,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<Track>, CatalogError>> {
        let needle = query.trim().to_lowercase();
        let found: Vec<Track> = self
            .tracks
            .iter()
            .filter(|track| allow_explicit || !track.explicit)
            .filter(|track| {
                track.name.to_lowercase().contains(&needle)
                    || track.artist.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect();
        Box::pin(async move { Ok(found) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, name: &str, explicit: bool) -> Track {
        Track {
            id: id.into(),
            name: name.into(),
            artist: "Band".into(),
            album: None,
            preview_url: Some(format!("https://cdn.test/{id}.mp3")),
            explicit,
        }
    }

    #[tokio::test]
    async fn filters_explicit_tracks_and_limits() {
        let catalog = StaticCatalog::new(vec![
            track("1", "Rain Song", false),
            track("2", "Rain Dance", true),
            track("3", "November Rain", false),
        ]);

        let clean = catalog.search_tracks("rain", false, 10).await.unwrap();
        assert_eq!(
            clean.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            ["1", "3"]
        );
        let limited = catalog.search_tracks("RAIN", true, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
