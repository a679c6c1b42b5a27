use std::{fmt, ops::Deref};

use serde::{Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{GameEntity, GameSettingsEntity, PlayerEntity},
    dto::{
        format_millis,
        validation::{
            validate_max_players_choice, validate_player_name, validate_rounds_choice,
            validate_time_limit,
        },
    },
};

/// Smallest and largest accepted `totalRounds` at creation.
pub const MIN_TOTAL_ROUNDS: u32 = 3;
pub const MAX_TOTAL_ROUNDS: u32 = 10;
/// Rounds played when the creator does not pick a count.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 3;

/// Canonical form of a game code typed by a player.
pub fn normalize_game_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Game code taken from a route path, normalized on extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCode(String);

impl<'de> Deserialize<'de> for GameCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|raw| Self(normalize_game_id(&raw)))
    }
}

impl Deref for GameCode {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload used to open a new game lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub player_name: String,
    /// Between 3 and 10, defaults to 3.
    #[validate(range(min = 3, max = 10))]
    pub total_rounds: Option<u32>,
}

/// Payload used to join a lobby, or the oldest open one when `gameId` is omitted.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub player_name: String,
    #[serde(default)]
    pub game_id: Option<String>,
}

/// Identity handed out on create and join.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub game_id: String,
    pub player_id: String,
    /// Opaque token to send back in the `x-session-token` header.
    pub session_token: String,
}

/// Full replacement of the lobby settings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSettingsDto {
    /// One of 3, 5, 7 or 10.
    pub rounds: u32,
    /// One of 3, 4, 5 or 6.
    pub max_players: u32,
    pub allow_explicit: bool,
    /// 60, 90, 120 or `null` for no limit.
    pub selection_time_limit: Option<u32>,
    /// 60, 90, 120 or `null` for no limit.
    pub ranking_time_limit: Option<u32>,
}

impl Validate for GameSettingsDto {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_rounds_choice(self.rounds) {
            errors.add("rounds", e);
        }
        if let Err(e) = validate_max_players_choice(self.max_players) {
            errors.add("maxPlayers", e);
        }
        if let Err(e) = validate_time_limit(self.selection_time_limit) {
            errors.add("selectionTimeLimit", e);
        }
        if let Err(e) = validate_time_limit(self.ranking_time_limit) {
            errors.add("rankingTimeLimit", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<GameSettingsDto> for GameSettingsEntity {
    fn from(value: GameSettingsDto) -> Self {
        Self {
            rounds: value.rounds,
            max_players: value.max_players,
            allow_explicit: value.allow_explicit,
            selection_time_limit: value.selection_time_limit,
            ranking_time_limit: value.ranking_time_limit,
        }
    }
}

impl From<GameSettingsEntity> for GameSettingsDto {
    fn from(value: GameSettingsEntity) -> Self {
        Self {
            rounds: value.rounds,
            max_players: value.max_players,
            allow_explicit: value.allow_explicit,
            selection_time_limit: value.selection_time_limit,
            ranking_time_limit: value.ranking_time_limit,
        }
    }
}

/// Player entry of a [`GameView`].
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub score: i64,
    pub has_joined: bool,
    pub joker_available: bool,
    pub is_creator: bool,
    pub joined_at: String,
}

impl From<(String, PlayerEntity)> for PlayerView {
    fn from((id, player): (String, PlayerEntity)) -> Self {
        Self {
            id,
            name: player.name,
            score: player.score,
            has_joined: player.has_joined,
            joker_available: player.joker_available,
            is_creator: player.is_creator,
            joined_at: format_millis(player.joined_at),
        }
    }
}

/// Read model of a game and its players, in join order.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: String,
    /// `waiting`, `round{N}_{phase}` or `finished`.
    pub status: String,
    pub player_count: u32,
    pub max_players: u32,
    pub current_round: u32,
    pub total_rounds: u32,
    pub creator_player_id: String,
    pub round_host_player_id: Option<String>,
    pub challenge: Option<String>,
    pub settings: GameSettingsDto,
    pub created_at: String,
    pub started_at: Option<String>,
    pub players: Vec<PlayerView>,
}

impl GameView {
    pub fn new(game_id: String, game: GameEntity, players: Vec<(String, PlayerEntity)>) -> Self {
        Self {
            game_id,
            status: game.status.to_string(),
            player_count: game.player_count,
            max_players: game.max_players,
            current_round: game.current_round,
            total_rounds: game.total_rounds,
            creator_player_id: game.creator_player_id,
            round_host_player_id: game.round_host_player_id,
            challenge: game.challenge,
            settings: game.settings.into(),
            created_at: format_millis(game.created_at),
            started_at: game.started_at.map(format_millis),
            players: players.into_iter().map(PlayerView::from).collect(),
        }
    }
}

/// Generic acknowledgement for state-changing actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_game_codes_are_normalized() {
        let code: GameCode = serde_json::from_str(r#"" abc123 ""#).unwrap();
        assert_eq!(&*code, "ABC123");
        assert_eq!(code.to_string(), "ABC123");
    }

    #[test]
    fn create_request_bounds_total_rounds() {
        let request: CreateGameRequest =
            serde_json::from_str(r#"{"playerName": "Ann", "totalRounds": 11}"#).unwrap();
        assert!(request.validate().is_err());

        let request: CreateGameRequest =
            serde_json::from_str(r#"{"playerName": "Ann"}"#).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn settings_reports_every_bad_field() {
        let settings = GameSettingsDto {
            rounds: 4,
            max_players: 8,
            allow_explicit: true,
            selection_time_limit: None,
            ranking_time_limit: Some(45),
        };
        let errors = settings.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("rounds"));
        assert!(fields.contains_key("maxPlayers"));
        assert!(fields.contains_key("rankingTimeLimit"));
        assert!(!fields.contains_key("selectionTimeLimit"));
    }
}
