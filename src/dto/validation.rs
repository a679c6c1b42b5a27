//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted player name, in characters.
pub const MAX_PLAYER_NAME_CHARS: usize = 25;
/// Accepted values for `settings.rounds`.
pub const ROUND_CHOICES: [u32; 4] = [3, 5, 7, 10];
/// Accepted values for `settings.maxPlayers`.
pub const MAX_PLAYER_CHOICES: [u32; 4] = [3, 4, 5, 6];
/// Accepted values for the phase timers, in seconds; `null` means no limit.
pub const TIME_LIMIT_CHOICES: [u32; 3] = [60, 90, 120];

/// Validates that a player name is non-blank and at most 25 characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("player_name_empty");
        err.message = Some("Player name must not be empty".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > MAX_PLAYER_NAME_CHARS {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {MAX_PLAYER_NAME_CHARS} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

fn validate_choice(code: &'static str, value: u32, choices: &[u32]) -> Result<(), ValidationError> {
    if choices.contains(&value) {
        return Ok(());
    }
    let mut err = ValidationError::new(code);
    err.message = Some(format!("{value} is not one of {choices:?}").into());
    Err(err)
}

pub fn validate_rounds_choice(rounds: u32) -> Result<(), ValidationError> {
    validate_choice("rounds_choice", rounds, &ROUND_CHOICES)
}

pub fn validate_max_players_choice(max_players: u32) -> Result<(), ValidationError> {
    validate_choice("max_players_choice", max_players, &MAX_PLAYER_CHOICES)
}

pub fn validate_time_limit(limit: Option<u32>) -> Result<(), ValidationError> {
    match limit {
        None => Ok(()),
        Some(seconds) => validate_choice("time_limit_choice", seconds, &TIME_LIMIT_CHOICES),
    }
}
