use tracing::info;
use validator::Validate;

use crate::{
    dao::models::{ChallengeEntity, PredefinedSongEntity},
    dto::challenge::{
        ChallengeDetailsQuery, PredefinedSongDto, SeedChallengeRequest, SeedChallengeResponse,
    },
    error::ServiceError,
    state::SharedState,
};

const DEFAULT_SEED_LIMIT: usize = 10;

/// Texts of every stored challenge, alphabetically.
pub async fn get_predefined_challenges(state: &SharedState) -> Result<Vec<String>, ServiceError> {
    let repository = state.repository().await?;
    let mut texts: Vec<String> = repository
        .list_challenges(None)
        .await?
        .into_iter()
        .map(|(_, challenge)| challenge.text)
        .collect();
    texts.sort();
    Ok(texts)
}

/// Curated songs of the challenge matching `text`.
pub async fn get_challenge_details(
    state: &SharedState,
    query: ChallengeDetailsQuery,
) -> Result<Vec<PredefinedSongDto>, ServiceError> {
    query.validate()?;
    let repository = state.repository().await?;
    let challenge = repository
        .get_challenge(None, &slugify(&query.text))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{}` not found", query.text)))?;
    Ok(challenge
        .predefined_songs
        .into_iter()
        .map(PredefinedSongDto::from)
        .collect())
}

/// Fill a challenge's curated pool from the catalog, replacing any previous one.
pub async fn seed_challenge(
    state: &SharedState,
    request: SeedChallengeRequest,
) -> Result<SeedChallengeResponse, ServiceError> {
    request.validate()?;
    let text = request.text.trim().to_owned();
    let slug = slugify(&text);
    if slug.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "challenge `{text}` has no usable characters"
        )));
    }
    let repository = state.repository().await?;

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .unwrap_or(text.as_str());
    let limit = request.limit.unwrap_or(DEFAULT_SEED_LIMIT);
    let tracks = state.catalog().search_tracks(query, false, limit).await?;

    let predefined_songs: Vec<PredefinedSongEntity> = tracks
        .into_iter()
        .filter_map(|track| {
            let preview_url = track.preview_url.filter(|url| !url.is_empty())?;
            Some(PredefinedSongEntity {
                track_id: track.id,
                title: track.name,
                artist: track.artist,
                preview_url: Some(preview_url),
            })
        })
        .collect();

    let challenge = ChallengeEntity {
        text: text.clone(),
        predefined_songs,
    };
    repository.put_challenge(None, &slug, &challenge).await?;
    info!(slug = %slug, songs = challenge.predefined_songs.len(), "challenge seeded");

    Ok(SeedChallengeResponse {
        slug,
        text,
        predefined_songs: challenge
            .predefined_songs
            .into_iter()
            .map(PredefinedSongDto::from)
            .collect(),
    })
}

/// Document key of a challenge text: lowercase alphanumerics joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_separators() {
        assert_eq!(slugify("Songs about Rain!"), "songs-about-rain");
        assert_eq!(slugify("  80's   hits "), "80-s-hits");
        assert_eq!(slugify("Été / Summer"), "été-summer");
        assert_eq!(slugify("?!"), "");
    }
}
