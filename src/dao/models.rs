use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::state::phase::{GameStatus, RoundPhase};

/// Settings chosen by the creator while the game is waiting for players.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSettingsEntity {
    /// Number of rounds to play.
    pub rounds: u32,
    /// Maximum number of joined players.
    pub max_players: u32,
    /// Whether explicit tracks may be searched and nominated.
    pub allow_explicit: bool,
    /// Advisory selection timer in seconds, `None` for no limit.
    pub selection_time_limit: Option<u32>,
    /// Advisory ranking timer in seconds, `None` for no limit.
    pub ranking_time_limit: Option<u32>,
}

/// Aggregate game document stored at `games/{gameId}`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameEntity {
    /// Current phase of the whole game.
    pub status: GameStatus,
    /// Number of players with `has_joined = true`.
    pub player_count: u32,
    /// Mirror of `settings.max_players`.
    pub max_players: u32,
    /// Round currently in play, 0 while waiting.
    pub current_round: u32,
    /// Mirror of `settings.rounds`.
    pub total_rounds: u32,
    pub creator_player_id: String,
    /// Host of the current round.
    pub round_host_player_id: Option<String>,
    /// Prompt of the current round.
    pub challenge: Option<String>,
    pub settings: GameSettingsEntity,
    /// Creation timestamp (milliseconds since the Unix epoch).
    pub created_at: i64,
    /// Start timestamp (milliseconds since the Unix epoch).
    pub started_at: Option<i64>,
}

/// Player document stored at `games/{gameId}/players/{playerId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntity {
    /// Display name, unique per game.
    pub name: String,
    /// Running total across rounds.
    pub score: i64,
    pub has_joined: bool,
    /// Reserved for a future joker rule.
    pub joker_available: bool,
    pub is_creator: bool,
    /// Join timestamp, defines the player-list order used for host rotation.
    pub joined_at: i64,
}

/// A song nominated by a player for the current round.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSongEntity {
    pub track_id: String,
    pub name: String,
    pub artist: String,
    pub preview_url: Option<String>,
    pub submitted_at: i64,
}

/// Entry of the final pool presented for listening and ranking.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankingSongEntity {
    pub track_id: String,
    pub name: String,
    pub artist: String,
    pub preview_url: Option<String>,
    /// Players who nominated this track; empty for predefined padding songs.
    #[serde(default)]
    pub submitted_by: Vec<String>,
}

/// Per-nomination outcome written by the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultEntity {
    pub player_id: String,
    pub player_name: String,
    pub track_id: String,
    pub song_name: String,
    pub artist: String,
    /// Sum of the ranks the song received; lower is better.
    pub rank_sum: u32,
    pub points: i64,
    pub duplicate_penalty: i64,
    pub total_score: i64,
    pub is_winner: bool,
}

/// Winners of a finished round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WinnerDataEntity {
    pub player_ids: Vec<String>,
    pub score: i64,
}

/// Round document stored at `games/{gameId}/rounds/{roundNumber}`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundEntity {
    pub round_number: u32,
    pub challenge: Option<String>,
    pub host_player_id: String,
    pub status: RoundPhase,
    /// Nominations keyed by player id.
    #[serde(default)]
    pub player_songs: BTreeMap<String, PlayerSongEntity>,
    #[serde(default)]
    pub songs_for_ranking: Vec<RankingSongEntity>,
    #[serde(default)]
    pub current_playing_track_index: usize,
    #[serde(default)]
    pub is_playing: bool,
    pub selection_start_time: Option<i64>,
    pub ranking_start_time: Option<i64>,
    #[serde(default)]
    pub results: Vec<RoundResultEntity>,
    pub winner_data: Option<WinnerDataEntity>,
    pub created_at: i64,
}

impl RoundEntity {
    /// Fresh round waiting for its host to pick a challenge.
    pub fn announcing(round_number: u32, host_player_id: String, now: i64) -> Self {
        Self {
            round_number,
            challenge: None,
            host_player_id,
            status: RoundPhase::Announcing,
            player_songs: BTreeMap::new(),
            songs_for_ranking: Vec::new(),
            current_playing_track_index: 0,
            is_playing: false,
            selection_start_time: None,
            ranking_start_time: None,
            results: Vec::new(),
            winner_data: None,
            created_at: now,
        }
    }

    /// Whether a non-empty challenge has been set.
    pub fn has_challenge(&self) -> bool {
        self.challenge
            .as_deref()
            .is_some_and(|challenge| !challenge.trim().is_empty())
    }
}

/// Ranking document stored at `.../rankings/{playerId}`, keyed by track id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntity {
    pub rankings: BTreeMap<String, u32>,
    pub submitted_at: i64,
}

/// Score document stored at `.../scores/{playerId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntity {
    /// Placement points plus duplicate penalty.
    pub round_score: i64,
    pub duplicate_penalty: i64,
    pub bonus_points: i64,
    pub joker_used: bool,
    pub total_score_for_round: i64,
}

/// Curated fallback track attached to a challenge.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedSongEntity {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub preview_url: Option<String>,
}

/// Challenge document stored at `challenges/{slug}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeEntity {
    pub text: String,
    #[serde(default)]
    pub predefined_songs: Vec<PredefinedSongEntity>,
}

/// Session document stored at `sessions/{token}`, binding a token to a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntity {
    pub game_id: String,
    pub player_id: String,
    pub created_at: i64,
}
