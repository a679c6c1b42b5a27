use std::collections::HashMap;

use tracing::info;

use crate::{
    dao::{
        document_store::run_in_transaction,
        repository::{GamePatch, GameRepository, RoundPatch},
    },
    error::ServiceError,
    services::{
        game_service::{joined_players, load_game},
        scoring::{RoundScoring, score_round},
    },
    state::phase::{GameStatus, RoundEvent, RoundPhase, next_phase},
};

/// Score a round waiting in `scoring` and finish it.
///
/// Score documents, player totals, round results and the game status are
/// committed in one transaction, so a failed run leaves the round untouched
/// in `scoring` and can simply be retried.
pub async fn calculate_scores(
    repository: &GameRepository,
    game_id: &str,
    round_number: u32,
) -> Result<RoundScoring, ServiceError> {
    let scoring = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            let expected = GameStatus::round(round_number, RoundPhase::Scoring);
            if game.status != expected {
                return Err(ServiceError::InvalidState(format!(
                    "game is {}, expected {expected}",
                    game.status
                )));
            }
            let round = repository
                .get_round(Some(&tx), game_id, round_number)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "round {round_number} of game `{game_id}` not found"
                    ))
                })?;
            let finished = next_phase(round.status, RoundEvent::ScoresCalculated)?;

            let players = joined_players(repository.list_players(Some(&tx), game_id).await?);
            let rankings = repository
                .list_rankings(Some(&tx), game_id, round_number)
                .await?;
            if rankings.len() != players.len() {
                return Err(ServiceError::InvalidState(format!(
                    "{} of {} players ranked round {round_number}",
                    rankings.len(),
                    players.len()
                )));
            }

            let names: HashMap<String, String> = players
                .into_iter()
                .map(|(id, player)| (id, player.name))
                .collect();
            let scoring = score_round(&round.player_songs, &names, &rankings);

            for (player_id, score) in &scoring.scores {
                repository
                    .create_score(Some(&tx), game_id, round_number, player_id, score)
                    .await?;
                repository
                    .increment_player_score(
                        Some(&tx),
                        game_id,
                        player_id,
                        score.total_score_for_round,
                    )
                    .await?;
            }
            repository
                .update_round(
                    Some(&tx),
                    game_id,
                    round_number,
                    &RoundPatch {
                        status: Some(finished),
                        results: Some(scoring.results.clone()),
                        winner_data: Some(scoring.winners.clone()),
                        is_playing: Some(false),
                        ..Default::default()
                    },
                )
                .await?;

            let status = if round_number >= game.settings.rounds {
                GameStatus::Finished
            } else {
                GameStatus::round(round_number, finished)
            };
            repository
                .update_game(
                    Some(&tx),
                    game_id,
                    &GamePatch {
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, ServiceError>(scoring)
        }
    })
    .await?;

    info!(
        game_id,
        round = round_number,
        winners = ?scoring.winners.player_ids,
        score = scoring.winners.score,
        "round scored"
    );
    Ok(scoring)
}
