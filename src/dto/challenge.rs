use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::PredefinedSongEntity;

/// Query string of the challenge details route.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChallengeDetailsQuery {
    #[validate(length(min = 1))]
    pub text: String,
}

/// Curated fallback song of a challenge.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedSongDto {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub preview_url: Option<String>,
}

impl From<PredefinedSongEntity> for PredefinedSongDto {
    fn from(value: PredefinedSongEntity) -> Self {
        Self {
            track_id: value.track_id,
            title: value.title,
            artist: value.artist,
            preview_url: value.preview_url,
        }
    }
}

/// Admin payload creating or refreshing a challenge from the catalog.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeedChallengeRequest {
    #[validate(length(min = 1, max = 200))]
    pub text: String,
    /// Catalog query, defaults to the challenge text.
    #[serde(default)]
    pub query: Option<String>,
    #[validate(range(min = 1, max = 50))]
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedChallengeResponse {
    pub slug: String,
    pub text: String,
    pub predefined_songs: Vec<PredefinedSongDto>,
}
