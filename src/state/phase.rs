use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Round-local phases, in play order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Host picks the challenge.
    Announcing,
    /// Players nominate one song each.
    SelectingSongs,
    /// Host drives synchronized playback of the pool.
    Listening,
    /// Players rank the songs of the others.
    Ranking,
    /// Scores are being computed.
    Scoring,
    /// Results are available.
    Finished,
    /// Reserved for a failed scoring run.
    ErrorScoring,
}

impl RoundPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            RoundPhase::Announcing => "announcing",
            RoundPhase::SelectingSongs => "selecting_songs",
            RoundPhase::Listening => "listening",
            RoundPhase::Ranking => "ranking",
            RoundPhase::Scoring => "scoring",
            RoundPhase::Finished => "finished",
            RoundPhase::ErrorScoring => "error_scoring",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundPhase {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let phase = match value {
            "announcing" => RoundPhase::Announcing,
            "selecting_songs" => RoundPhase::SelectingSongs,
            "listening" => RoundPhase::Listening,
            "ranking" => RoundPhase::Ranking,
            "scoring" => RoundPhase::Scoring,
            "finished" => RoundPhase::Finished,
            "error_scoring" => RoundPhase::ErrorScoring,
            other => return Err(StatusParseError(other.to_owned())),
        };
        Ok(phase)
    }
}

/// Game-level status, persisted as `waiting`, `round{N}_{phase}` or `finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GameStatus {
    /// Lobby: players may join and the creator may change settings.
    Waiting,
    /// Mirror of the current round's phase.
    Round { number: u32, phase: RoundPhase },
    /// Terminal state after the last configured round.
    Finished,
}

/// Raised when a stored status string does not match the known template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status `{0}`")]
pub struct StatusParseError(pub String);

impl GameStatus {
    pub const fn round(number: u32, phase: RoundPhase) -> Self {
        GameStatus::Round { number, phase }
    }

    /// Round number and phase when a round is in play.
    pub fn round_phase(self) -> Option<(u32, RoundPhase)> {
        match self {
            GameStatus::Round { number, phase } => Some((number, phase)),
            _ => None,
        }
    }

    /// Whether the status mirrors `phase`, whatever the round number.
    pub fn is_phase(self, phase: RoundPhase) -> bool {
        matches!(self, GameStatus::Round { phase: current, .. } if current == phase)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Waiting => f.write_str("waiting"),
            GameStatus::Round { number, phase } => write!(f, "round{number}_{phase}"),
            GameStatus::Finished => f.write_str("finished"),
        }
    }
}

impl FromStr for GameStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "waiting" => return Ok(GameStatus::Waiting),
            "finished" => return Ok(GameStatus::Finished),
            _ => {}
        }

        let invalid = || StatusParseError(value.to_owned());
        let (number, phase) = value
            .strip_prefix("round")
            .and_then(|rest| rest.split_once('_'))
            .ok_or_else(invalid)?;
        let number = number.parse::<u32>().map_err(|_| invalid())?;
        let phase = phase.parse::<RoundPhase>().map_err(|_| invalid())?;
        Ok(GameStatus::Round { number, phase })
    }
}

impl TryFrom<String> for GameStatus {
    type Error = StatusParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GameStatus> for String {
    fn from(value: GameStatus) -> Self {
        value.to_string()
    }
}

/// Events moving a round forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Host opens song selection.
    StartSelection,
    /// Last active player nominated a song.
    AllSongsSubmitted,
    /// Host opens ranking.
    StartRanking,
    /// Last active player submitted a ranking.
    AllRankingsSubmitted,
    /// Scoring engine committed the results.
    ScoresCalculated,
    /// Scoring engine gave up on the round.
    ScoringFailed,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    pub from: RoundPhase,
    pub event: RoundEvent,
}

/// Compute the phase reached by applying `event` in `from`.
pub fn next_phase(from: RoundPhase, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
    let next = match (from, event) {
        (RoundPhase::Announcing, RoundEvent::StartSelection) => RoundPhase::SelectingSongs,
        (RoundPhase::SelectingSongs, RoundEvent::AllSongsSubmitted) => RoundPhase::Listening,
        (RoundPhase::Listening, RoundEvent::StartRanking) => RoundPhase::Ranking,
        (RoundPhase::Ranking, RoundEvent::AllRankingsSubmitted) => RoundPhase::Scoring,
        (RoundPhase::Scoring, RoundEvent::ScoresCalculated) => RoundPhase::Finished,
        (RoundPhase::Scoring, RoundEvent::ScoringFailed) => RoundPhase::ErrorScoring,
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_round_follows_play_order() {
        let mut phase = RoundPhase::Announcing;
        for event in [
            RoundEvent::StartSelection,
            RoundEvent::AllSongsSubmitted,
            RoundEvent::StartRanking,
            RoundEvent::AllRankingsSubmitted,
            RoundEvent::ScoresCalculated,
        ] {
            phase = next_phase(phase, event).unwrap();
        }
        assert_eq!(phase, RoundPhase::Finished);
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let err = next_phase(RoundPhase::Announcing, RoundEvent::StartRanking).unwrap_err();
        assert_eq!(err.from, RoundPhase::Announcing);
        assert_eq!(err.event, RoundEvent::StartRanking);
        assert!(next_phase(RoundPhase::Finished, RoundEvent::ScoresCalculated).is_err());
    }

    #[test]
    fn game_status_uses_round_template() {
        let status = GameStatus::round(2, RoundPhase::SelectingSongs);
        assert_eq!(status.to_string(), "round2_selecting_songs");
        assert_eq!("round2_selecting_songs".parse::<GameStatus>().unwrap(), status);
        assert_eq!(
            "round10_error_scoring".parse::<GameStatus>().unwrap().round_phase(),
            Some((10, RoundPhase::ErrorScoring))
        );
        assert_eq!("waiting".parse::<GameStatus>().unwrap(), GameStatus::Waiting);
    }

    #[test]
    fn unknown_statuses_fail_to_parse() {
        for raw in [
            "transitioning_to_announcing",
            "round_listening",
            "roundx_ranking",
            "round1_dancing",
        ] {
            assert!(raw.parse::<GameStatus>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let json = serde_json::to_value(GameStatus::round(1, RoundPhase::Scoring)).unwrap();
        assert_eq!(json, serde_json::json!("round1_scoring"));
        let phase = serde_json::to_value(RoundPhase::SelectingSongs).unwrap();
        assert_eq!(phase, serde_json::json!("selecting_songs"));
    }
}
