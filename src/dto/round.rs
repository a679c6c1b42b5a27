use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{RankingSongEntity, RoundEntity, RoundResultEntity, WinnerDataEntity},
    dto::format_millis,
    state::phase::RoundPhase,
};

/// Host-provided prompt for the current round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetChallengeRequest {
    #[validate(length(min = 1, max = 200))]
    pub challenge: String,
}

/// Track picked from the catalog search results.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultInput {
    #[validate(length(min = 1))]
    pub track_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub artist: String,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// A nomination: either a catalog search result or a predefined song of the challenge.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NominationRequest {
    #[serde(default)]
    pub search_result: Option<SearchResultInput>,
    #[serde(default)]
    pub predefined_track_id: Option<String>,
}

/// Resolved form of a [`NominationRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nomination {
    SearchResult {
        track_id: String,
        name: String,
        artist: String,
        preview_url: Option<String>,
    },
    Predefined(String),
}

impl Validate for NominationRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match (&self.search_result, &self.predefined_track_id) {
            (Some(result), None) => {
                if let Err(nested) = result.validate() {
                    errors.merge_self("searchResult", Err(nested));
                }
            }
            (None, Some(track_id)) if !track_id.trim().is_empty() => {}
            (None, Some(_)) => {
                let mut err = ValidationError::new("predefined_track_id_empty");
                err.message = Some("predefinedTrackId must not be empty".into());
                errors.add("predefinedTrackId", err);
            }
            _ => {
                let mut err = ValidationError::new("nomination_shape");
                err.message =
                    Some("exactly one of searchResult or predefinedTrackId is required".into());
                errors.add("nomination", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl NominationRequest {
    /// Collapse the two optional fields; call after [`Validate::validate`].
    pub fn into_nomination(self) -> Option<Nomination> {
        match (self.search_result, self.predefined_track_id) {
            (Some(result), None) => Some(Nomination::SearchResult {
                track_id: result.track_id,
                name: result.name,
                artist: result.artist,
                preview_url: result.preview_url.filter(|url| !url.is_empty()),
            }),
            (None, Some(track_id)) => Some(Nomination::Predefined(track_id)),
            _ => None,
        }
    }
}

/// Playback commands available to the host while listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackAction {
    Play,
    Pause,
    Next,
    Prev,
    SeekToIndex,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRequest {
    pub action: PlaybackAction,
    /// Used by `seekToIndex`; an out-of-range index is ignored.
    #[serde(default)]
    pub target_index: Option<usize>,
}

/// Ranks assigned by a player, keyed by track id; 1 is best.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingRequest {
    pub rankings: BTreeMap<String, u32>,
}

impl Validate for RankingRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.rankings.is_empty() {
            let mut err = ValidationError::new("rankings_empty");
            err.message = Some("rankings must not be empty".into());
            errors.add("rankings", err);
        } else if let Some((track_id, _)) = self.rankings.iter().find(|(_, rank)| **rank == 0) {
            let mut err = ValidationError::new("rank_range");
            err.message = Some(format!("rank of `{track_id}` must be at least 1").into());
            errors.add("rankings", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Whether a submission completed its phase.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    /// `true` for the last submission, which moved the round to its next phase.
    pub phase_completed: bool,
}

/// Query string of the track search route.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackSearchQuery {
    #[validate(length(min = 1, max = 100))]
    pub query: String,
    #[serde(default)]
    pub allow_explicit: Option<bool>,
}

/// Song of the listening and ranking pool.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolSongView {
    pub track_id: String,
    pub name: String,
    pub artist: String,
    pub preview_url: Option<String>,
    /// Nominating players, revealed once the round is finished.
    pub submitted_by: Option<Vec<String>>,
}

impl PoolSongView {
    fn new(song: RankingSongEntity, reveal: bool) -> Self {
        Self {
            track_id: song.track_id,
            name: song.name,
            artist: song.artist,
            preview_url: song.preview_url,
            submitted_by: reveal.then_some(song.submitted_by),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultView {
    pub player_id: String,
    pub player_name: String,
    pub track_id: String,
    pub song_name: String,
    pub artist: String,
    pub rank_sum: u32,
    pub points: i64,
    pub duplicate_penalty: i64,
    pub total_score: i64,
    pub is_winner: bool,
}

impl From<RoundResultEntity> for RoundResultView {
    fn from(value: RoundResultEntity) -> Self {
        Self {
            player_id: value.player_id,
            player_name: value.player_name,
            track_id: value.track_id,
            song_name: value.song_name,
            artist: value.artist,
            rank_sum: value.rank_sum,
            points: value.points,
            duplicate_penalty: value.duplicate_penalty,
            total_score: value.total_score,
            is_winner: value.is_winner,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WinnerView {
    pub player_ids: Vec<String>,
    pub score: i64,
}

impl From<WinnerDataEntity> for WinnerView {
    fn from(value: WinnerDataEntity) -> Self {
        Self {
            player_ids: value.player_ids,
            score: value.score,
        }
    }
}

/// Read model of a round. Nominated tracks stay hidden until listening starts.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub round_number: u32,
    pub challenge: Option<String>,
    pub host_player_id: String,
    pub status: RoundPhase,
    /// Players who already nominated a song.
    pub nominated_player_ids: Vec<String>,
    pub songs_for_ranking: Vec<PoolSongView>,
    pub current_playing_track_index: usize,
    pub is_playing: bool,
    pub selection_start_time: Option<String>,
    pub ranking_start_time: Option<String>,
    pub results: Vec<RoundResultView>,
    pub winner_data: Option<WinnerView>,
    pub created_at: String,
}

impl From<RoundEntity> for RoundView {
    fn from(round: RoundEntity) -> Self {
        let reveal = round.status == RoundPhase::Finished;
        Self {
            round_number: round.round_number,
            challenge: round.challenge,
            host_player_id: round.host_player_id,
            status: round.status,
            nominated_player_ids: round.player_songs.into_keys().collect(),
            songs_for_ranking: round
                .songs_for_ranking
                .into_iter()
                .map(|song| PoolSongView::new(song, reveal))
                .collect(),
            current_playing_track_index: round.current_playing_track_index,
            is_playing: round.is_playing,
            selection_start_time: round.selection_start_time.map(format_millis),
            ranking_start_time: round.ranking_start_time.map(format_millis),
            results: round.results.into_iter().map(Into::into).collect(),
            winner_data: round.winner_data.map(Into::into),
            created_at: format_millis(round.created_at),
        }
    }
}

/// Outcome of a manual scoring run.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoresResponse {
    pub results: Vec<RoundResultView>,
    pub winner_data: WinnerView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nomination_requires_exactly_one_source() {
        let both: NominationRequest = serde_json::from_str(
            r#"{"searchResult": {"trackId": "1", "name": "a", "artist": "b"}, "predefinedTrackId": "2"}"#,
        )
        .unwrap();
        assert!(both.validate().is_err());

        let neither: NominationRequest = serde_json::from_str("{}").unwrap();
        assert!(neither.validate().is_err());

        let predefined: NominationRequest =
            serde_json::from_str(r#"{"predefinedTrackId": "42"}"#).unwrap();
        assert!(predefined.validate().is_ok());
        assert_eq!(
            predefined.into_nomination(),
            Some(Nomination::Predefined("42".into()))
        );
    }

    #[test]
    fn search_result_fields_are_checked() {
        let request: NominationRequest = serde_json::from_str(
            r#"{"searchResult": {"trackId": "", "name": "a", "artist": "b"}}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn playback_actions_use_camel_case() {
        let request: PlaybackRequest =
            serde_json::from_str(r#"{"action": "seekToIndex", "targetIndex": 3}"#).unwrap();
        assert_eq!(request.action, PlaybackAction::SeekToIndex);
        assert_eq!(request.target_index, Some(3));
    }

    #[test]
    fn rankings_reject_zero_and_empty() {
        let empty = RankingRequest {
            rankings: BTreeMap::new(),
        };
        assert!(empty.validate().is_err());

        let zero = RankingRequest {
            rankings: BTreeMap::from([("t1".to_string(), 0)]),
        };
        assert!(zero.validate().is_err());

        let ok = RankingRequest {
            rankings: BTreeMap::from([("t1".to_string(), 1)]),
        };
        assert!(ok.validate().is_ok());
    }
}
