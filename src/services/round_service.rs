//! Round phase state machine.
//!
//! Every operation runs as one optimistic transaction. Guards read the game
//! and the round through the transaction so that the "last submitter flips
//! the phase" checks are replayed on conflict.

use std::collections::BTreeMap;

use tracing::{debug, info};
use validator::Validate;

use crate::{
    dao::{
        document_store::{Transaction, run_in_transaction},
        models::{
            GameEntity, PlayerEntity, PlayerSongEntity, PredefinedSongEntity, RankingEntity,
            RankingSongEntity, RoundEntity,
        },
        repository::{GamePatch, GameRepository, RoundPatch},
    },
    dto::round::{
        Nomination, NominationRequest, PlaybackAction, PlaybackRequest, RankingRequest,
        RoundView, SetChallengeRequest, SubmissionResponse, TrackSearchQuery,
    },
    error::ServiceError,
    services::{
        catalog::Track,
        challenge_service::slugify,
        game_service::{joined_players, load_game},
        identity::CallerIdentity,
        now_millis, random_index, song_pool,
    },
    state::{
        SharedState,
        phase::{GameStatus, RoundEvent, RoundPhase, next_phase},
    },
};

/// Outcome of [`start_next_round`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextRound {
    Started { round_number: u32, host_player_id: String },
    GameFinished,
}

/// Set the prompt of an announcing round; host only, once.
pub async fn set_challenge(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    round_number: u32,
    request: SetChallengeRequest,
) -> Result<(), ServiceError> {
    request.validate()?;
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;
    let challenge = request.challenge.trim().to_owned();
    if challenge.is_empty() {
        return Err(ServiceError::InvalidInput(
            "challenge must not be blank".into(),
        ));
    }

    run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let challenge = challenge.clone();
        async move {
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            ensure_host(&round, caller)?;
            if round.status != RoundPhase::Announcing {
                return Err(ServiceError::InvalidState(format!(
                    "round {round_number} is {}, the challenge can only be set while announcing",
                    round.status
                )));
            }
            if round.has_challenge() {
                return Err(ServiceError::InvalidState(format!(
                    "round {round_number} already has a challenge"
                )));
            }

            repository
                .update_round(
                    Some(&tx),
                    game_id,
                    round_number,
                    &RoundPatch {
                        challenge: Some(challenge.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            repository
                .update_game(
                    Some(&tx),
                    game_id,
                    &GamePatch {
                        challenge: Some(challenge),
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, ServiceError>(())
        }
    })
    .await?;

    info!(game_id, round = round_number, "challenge set");
    Ok(())
}

/// Open song selection once the host has set the challenge.
pub async fn start_selection_phase(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
) -> Result<(), ServiceError> {
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;

    let round_number = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            let round_number = current_round(&game, RoundPhase::Announcing)?;
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            ensure_host(&round, caller)?;
            let next = next_phase(round.status, RoundEvent::StartSelection)?;
            if !round.has_challenge() {
                return Err(ServiceError::InvalidState(
                    "the host must set a challenge before selection starts".into(),
                ));
            }

            write_phase(
                &repository,
                &tx,
                game_id,
                round_number,
                next,
                RoundPatch {
                    selection_start_time: Some(now_millis()),
                    ..Default::default()
                },
            )
            .await?;
            Ok::<_, ServiceError>(round_number)
        }
    })
    .await?;

    info!(game_id, round = round_number, "selection phase started");
    Ok(())
}

/// Record the caller's nomination; the last active player's one builds the
/// listening pool and moves the round to `listening`.
pub async fn submit_song_nomination(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    request: NominationRequest,
) -> Result<SubmissionResponse, ServiceError> {
    request.validate()?;
    let nomination = request.into_nomination().ok_or_else(|| {
        ServiceError::InvalidInput("exactly one of searchResult or predefinedTrackId".into())
    })?;
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;

    let (round_number, completed) = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let nomination = nomination.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            let round_number = current_round(&game, RoundPhase::SelectingSongs)?;
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            if round.status != RoundPhase::SelectingSongs {
                return Err(ServiceError::InvalidState(format!(
                    "round {round_number} is not accepting nominations ({})",
                    round.status
                )));
            }

            let players = joined_players(repository.list_players(Some(&tx), game_id).await?);
            if !players.iter().any(|(id, _)| *id == caller.player_id) {
                return Err(ServiceError::PermissionDenied(
                    "only joined players can nominate".into(),
                ));
            }
            if round.player_songs.contains_key(&caller.player_id) {
                return Err(ServiceError::AlreadyExists(format!(
                    "player `{}` already nominated a song this round",
                    caller.player_id
                )));
            }

            let challenge = match round.challenge.as_deref().or(game.challenge.as_deref()) {
                Some(text) => repository.get_challenge(Some(&tx), &slugify(text)).await?,
                None => None,
            };
            let predefined = challenge
                .map(|challenge| challenge.predefined_songs)
                .unwrap_or_default();

            let now = now_millis();
            let song = match nomination {
                Nomination::SearchResult {
                    track_id,
                    name,
                    artist,
                    preview_url,
                } => PlayerSongEntity {
                    track_id,
                    name,
                    artist,
                    preview_url,
                    submitted_at: now,
                },
                Nomination::Predefined(track_id) => {
                    let song = predefined
                        .iter()
                        .find(|song| song.track_id == track_id)
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "predefined track `{track_id}` is not part of this challenge"
                            ))
                        })?;
                    PlayerSongEntity {
                        track_id: song.track_id.clone(),
                        name: song.title.clone(),
                        artist: song.artist.clone(),
                        preview_url: song.preview_url.clone(),
                        submitted_at: now,
                    }
                }
            };

            let mut player_songs = round.player_songs;
            player_songs.insert(caller.player_id.clone(), song);

            let completed = players
                .iter()
                .all(|(id, _)| player_songs.contains_key(id));
            if !completed {
                repository
                    .update_round(
                        Some(&tx),
                        game_id,
                        round_number,
                        &RoundPatch {
                            player_songs: Some(player_songs),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok((round_number, false));
            }

            let next = next_phase(round.status, RoundEvent::AllSongsSubmitted)?;
            let pool = assemble_pool(&player_songs, &predefined);
            write_phase(
                &repository,
                &tx,
                game_id,
                round_number,
                next,
                RoundPatch {
                    player_songs: Some(player_songs),
                    songs_for_ranking: Some(pool),
                    current_playing_track_index: Some(0),
                    is_playing: Some(false),
                    ..Default::default()
                },
            )
            .await?;
            Ok::<_, ServiceError>((round_number, true))
        }
    })
    .await?;

    info!(
        game_id,
        round = round_number,
        player_id = %caller.player_id,
        completed,
        "song nominated"
    );
    Ok(SubmissionResponse {
        phase_completed: completed,
    })
}

/// Move from listening to ranking; host only.
pub async fn start_ranking_phase(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
) -> Result<(), ServiceError> {
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;

    let round_number = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            let round_number = current_round(&game, RoundPhase::Listening)?;
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            ensure_host(&round, caller)?;
            let next = next_phase(round.status, RoundEvent::StartRanking)?;

            write_phase(
                &repository,
                &tx,
                game_id,
                round_number,
                next,
                RoundPatch {
                    ranking_start_time: Some(now_millis()),
                    is_playing: round.is_playing.then_some(false),
                    ..Default::default()
                },
            )
            .await?;
            Ok::<_, ServiceError>(round_number)
        }
    })
    .await?;

    info!(game_id, round = round_number, "ranking phase started");
    Ok(())
}

/// Drive the shared player while listening; host only.
pub async fn control_playback(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    request: PlaybackRequest,
) -> Result<(), ServiceError> {
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;
    let PlaybackRequest {
        action,
        target_index,
    } = request;

    run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            let round_number = current_round(&game, RoundPhase::Listening)?;
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            ensure_host(&round, caller)?;
            if round.status != RoundPhase::Listening {
                return Err(ServiceError::InvalidState(format!(
                    "playback is only available while listening ({})",
                    round.status
                )));
            }

            match playback_patch(&round, action, target_index) {
                Some(patch) => {
                    repository
                        .update_round(Some(&tx), game_id, round_number, &patch)
                        .await?
                }
                None => debug!(game_id, ?action, "playback unchanged"),
            }
            Ok::<_, ServiceError>(())
        }
    })
    .await
}

/// Record the caller's ranking; the last active player's one moves the round
/// to `scoring`.
pub async fn submit_ranking(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    request: RankingRequest,
) -> Result<SubmissionResponse, ServiceError> {
    request.validate()?;
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;
    let rankings = request.rankings;

    let (round_number, completed) = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let rankings = rankings.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            // A repeat stays a duplicate even once the last ranking moved the phase on.
            let existing = repository
                .list_rankings(Some(&tx), game_id, game.current_round)
                .await?;
            if existing.iter().any(|(id, _)| *id == caller.player_id) {
                return Err(ServiceError::AlreadyExists(format!(
                    "player `{}` already ranked this round",
                    caller.player_id
                )));
            }

            let round_number = current_round(&game, RoundPhase::Ranking)?;
            let round = load_round(&repository, &tx, game_id, round_number).await?;
            if round.status != RoundPhase::Ranking {
                return Err(ServiceError::InvalidState(format!(
                    "round {round_number} is not accepting rankings ({})",
                    round.status
                )));
            }

            let players = joined_players(repository.list_players(Some(&tx), game_id).await?);
            if !players.iter().any(|(id, _)| *id == caller.player_id) {
                return Err(ServiceError::PermissionDenied(
                    "only joined players can rank".into(),
                ));
            }
            check_ranking_keys(&round, &caller.player_id, &rankings)?;

            repository
                .create_ranking(
                    Some(&tx),
                    game_id,
                    round_number,
                    &caller.player_id,
                    &RankingEntity {
                        rankings,
                        submitted_at: now_millis(),
                    },
                )
                .await?;

            let completed = players.iter().all(|(id, _)| {
                *id == caller.player_id || existing.iter().any(|(ranked, _)| ranked == id)
            });
            if completed {
                let next = next_phase(round.status, RoundEvent::AllRankingsSubmitted)?;
                write_phase(
                    &repository,
                    &tx,
                    game_id,
                    round_number,
                    next,
                    RoundPatch::default(),
                )
                .await?;
            }
            Ok::<_, ServiceError>((round_number, completed))
        }
    })
    .await?;

    info!(
        game_id,
        round = round_number,
        player_id = %caller.player_id,
        completed,
        "ranking submitted"
    );
    Ok(SubmissionResponse {
        phase_completed: completed,
    })
}

/// Open the next round with the following host, or finish the game after
/// the last configured round.
pub async fn start_next_round(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
) -> Result<NextRound, ServiceError> {
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;

    let outcome = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            if game.status == GameStatus::Finished {
                return Ok(NextRound::GameFinished);
            }
            let round_number = current_round(&game, RoundPhase::Finished)?;
            if game.round_host_player_id.as_deref() != Some(caller.player_id.as_str()) {
                return Err(ServiceError::PermissionDenied(
                    "only the round host can start the next round".into(),
                ));
            }

            if round_number >= game.settings.rounds {
                repository
                    .update_game(
                        Some(&tx),
                        game_id,
                        &GamePatch {
                            status: Some(GameStatus::Finished),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(NextRound::GameFinished);
            }

            let players = joined_players(repository.list_players(Some(&tx), game_id).await?);
            if players.is_empty() {
                return Err(ServiceError::InvalidState(format!(
                    "game `{game_id}` has no joined players"
                )));
            }
            let host = next_host(&players, game.round_host_player_id.as_deref());
            let next_number = round_number + 1;
            let now = now_millis();

            repository
                .create_round(
                    Some(&tx),
                    game_id,
                    &RoundEntity::announcing(next_number, host.clone(), now),
                )
                .await?;
            repository
                .update_game(
                    Some(&tx),
                    game_id,
                    &GamePatch {
                        status: Some(GameStatus::round(next_number, RoundPhase::Announcing)),
                        current_round: Some(next_number),
                        round_host_player_id: Some(host.clone()),
                        challenge: Some(placeholder_challenge(next_number)),
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, ServiceError>(NextRound::Started {
                round_number: next_number,
                host_player_id: host,
            })
        }
    })
    .await?;

    match &outcome {
        NextRound::Started {
            round_number,
            host_player_id,
        } => info!(game_id, round = round_number, host = %host_player_id, "next round started"),
        NextRound::GameFinished => info!(game_id, "game finished"),
    }
    Ok(outcome)
}

/// Read-only projection of a round.
pub async fn get_round(
    state: &SharedState,
    game_id: &str,
    round_number: u32,
) -> Result<RoundView, ServiceError> {
    let repository = state.repository().await?;
    let round = repository
        .get_round(None, game_id, round_number)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("round {round_number} of game `{game_id}` not found"))
        })?;
    Ok(round.into())
}

/// Search the catalog for a player of the game, honouring the explicit setting.
pub async fn search_music_tracks(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    query: TrackSearchQuery,
) -> Result<Vec<Track>, ServiceError> {
    query.validate()?;
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;
    let game = load_game(&repository, None, game_id).await?;

    let allow_explicit = game.settings.allow_explicit && query.allow_explicit.unwrap_or(true);
    let tracks = state
        .catalog()
        .search_tracks(query.query.trim(), allow_explicit, state.config().search_limit)
        .await?;
    debug!(game_id, results = tracks.len(), allow_explicit, "track search");
    Ok(tracks)
}

async fn load_round(
    repository: &GameRepository,
    tx: &Transaction,
    game_id: &str,
    round_number: u32,
) -> Result<RoundEntity, ServiceError> {
    repository
        .get_round(Some(tx), game_id, round_number)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("round {round_number} of game `{game_id}` not found"))
        })
}

/// Round number when the game mirrors `expected`.
fn current_round(game: &GameEntity, expected: RoundPhase) -> Result<u32, ServiceError> {
    match game.status.round_phase() {
        Some((number, phase)) if phase == expected => Ok(number),
        _ => Err(ServiceError::InvalidState(format!(
            "game is {}, expected round phase {expected}",
            game.status
        ))),
    }
}

fn ensure_host(round: &RoundEntity, caller: &CallerIdentity) -> Result<(), ServiceError> {
    if round.host_player_id == caller.player_id {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(format!(
            "only the host of round {} can do this",
            round.round_number
        )))
    }
}

/// Stage the round patch with its new phase and the mirrored game status.
async fn write_phase(
    repository: &GameRepository,
    tx: &Transaction,
    game_id: &str,
    round_number: u32,
    phase: RoundPhase,
    mut patch: RoundPatch,
) -> Result<(), ServiceError> {
    patch.status = Some(phase);
    repository
        .update_round(Some(tx), game_id, round_number, &patch)
        .await?;
    repository
        .update_game(
            Some(tx),
            game_id,
            &GamePatch {
                status: Some(GameStatus::round(round_number, phase)),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

fn assemble_pool(
    player_songs: &BTreeMap<String, PlayerSongEntity>,
    predefined: &[PredefinedSongEntity],
) -> Vec<RankingSongEntity> {
    let mut rng = rand::rng();
    song_pool::build_pool(player_songs, predefined, &mut rng)
}

/// A ranking orders every pool song except the caller's own nomination,
/// using each rank from 1 to the number of those songs exactly once.
fn check_ranking_keys(
    round: &RoundEntity,
    player_id: &str,
    rankings: &BTreeMap<String, u32>,
) -> Result<(), ServiceError> {
    let own = round
        .player_songs
        .get(player_id)
        .map(|song| song.track_id.as_str());
    if let Some(own) = own.filter(|own| rankings.contains_key(*own)) {
        return Err(ServiceError::InvalidInput(format!(
            "players cannot rank their own nomination `{own}`"
        )));
    }
    if let Some(unknown) = rankings
        .keys()
        .find(|key| !round.songs_for_ranking.iter().any(|song| song.track_id == **key))
    {
        return Err(ServiceError::InvalidInput(format!(
            "track `{unknown}` is not part of this round"
        )));
    }

    let expected: Vec<&str> = round
        .songs_for_ranking
        .iter()
        .map(|song| song.track_id.as_str())
        .filter(|track| Some(*track) != own)
        .collect();
    if let Some(missing) = expected.iter().find(|track| !rankings.contains_key(**track)) {
        return Err(ServiceError::InvalidInput(format!(
            "track `{missing}` must be ranked"
        )));
    }

    let mut ranks: Vec<u32> = rankings.values().copied().collect();
    ranks.sort_unstable();
    let complete = ranks.iter().zip(1u32..).all(|(rank, position)| *rank == position);
    if !complete {
        return Err(ServiceError::InvalidInput(format!(
            "ranks must use each value from 1 to {} once",
            expected.len()
        )));
    }
    Ok(())
}

/// Fields changed by a playback action, or `None` when nothing changes.
fn playback_patch(
    round: &RoundEntity,
    action: PlaybackAction,
    target_index: Option<usize>,
) -> Option<RoundPatch> {
    let count = round.songs_for_ranking.len();
    let current = round.current_playing_track_index;
    let (is_playing, index) = match action {
        PlaybackAction::Play => (true, current),
        PlaybackAction::Pause => (false, current),
        PlaybackAction::Next if count > 0 => (round.is_playing, (current + 1) % count),
        PlaybackAction::Prev if count > 0 => (round.is_playing, (current + count - 1) % count),
        PlaybackAction::SeekToIndex => match target_index {
            Some(target) if target < count => (round.is_playing, target),
            _ => (round.is_playing, current),
        },
        PlaybackAction::Next | PlaybackAction::Prev => (round.is_playing, current),
    };

    let patch = RoundPatch {
        is_playing: (is_playing != round.is_playing).then_some(is_playing),
        current_playing_track_index: (index != current).then_some(index),
        ..Default::default()
    };
    (patch.is_playing.is_some() || patch.current_playing_track_index.is_some()).then_some(patch)
}

/// Player after the current host in join order, or a random one when the
/// current host is unknown.
fn next_host(players: &[(String, PlayerEntity)], current: Option<&str>) -> String {
    let position = current.and_then(|host| players.iter().position(|(id, _)| id == host));
    let index = match position {
        Some(index) => (index + 1) % players.len(),
        None => random_index(players.len()),
    };
    players[index].0.clone()
}

fn placeholder_challenge(round_number: u32) -> String {
    format!("Round {round_number}: waiting for the host's challenge")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::GameSettingsEntity;

    fn round_with_pool(count: usize) -> RoundEntity {
        let mut round = RoundEntity::announcing(1, "host".into(), 0);
        round.status = RoundPhase::Listening;
        round.songs_for_ranking = (0..count)
            .map(|i| RankingSongEntity {
                track_id: format!("t{i}"),
                name: format!("song {i}"),
                artist: "a".into(),
                preview_url: None,
                submitted_by: vec![format!("p{i}")],
            })
            .collect();
        round
    }

    fn player() -> PlayerEntity {
        PlayerEntity {
            name: "n".into(),
            score: 0,
            has_joined: true,
            joker_available: true,
            is_creator: false,
            joined_at: 0,
        }
    }

    #[test]
    fn playback_wraps_and_ignores_out_of_range_seeks() {
        let round = round_with_pool(3);

        let patch = playback_patch(&round, PlaybackAction::Prev, None).unwrap();
        assert_eq!(patch.current_playing_track_index, Some(2));
        assert_eq!(patch.is_playing, None);

        let patch = playback_patch(&round, PlaybackAction::Play, None).unwrap();
        assert_eq!(patch.is_playing, Some(true));
        assert_eq!(patch.current_playing_track_index, None);

        assert!(playback_patch(&round, PlaybackAction::SeekToIndex, Some(3)).is_none());
        assert!(playback_patch(&round, PlaybackAction::Pause, None).is_none());
        assert_eq!(
            playback_patch(&round, PlaybackAction::SeekToIndex, Some(1))
                .unwrap()
                .current_playing_track_index,
            Some(1)
        );
    }

    #[test]
    fn next_wraps_to_first_track() {
        let mut round = round_with_pool(2);
        round.current_playing_track_index = 1;
        let patch = playback_patch(&round, PlaybackAction::Next, None).unwrap();
        assert_eq!(patch.current_playing_track_index, Some(0));
    }

    #[test]
    fn host_rotates_in_join_order() {
        let players = vec![
            ("a".to_string(), player()),
            ("b".to_string(), player()),
            ("c".to_string(), player()),
        ];
        assert_eq!(next_host(&players, Some("a")), "b");
        assert_eq!(next_host(&players, Some("c")), "a");
        let fallback = next_host(&players, Some("gone"));
        assert!(players.iter().any(|(id, _)| *id == fallback));
    }

    #[test]
    fn ranking_keys_are_checked_against_pool() {
        let mut round = round_with_pool(3);
        round.player_songs.insert(
            "p0".into(),
            PlayerSongEntity {
                track_id: "t0".into(),
                name: "song 0".into(),
                artist: "a".into(),
                preview_url: None,
                submitted_at: 0,
            },
        );

        let ok = BTreeMap::from([("t1".to_string(), 1), ("t2".to_string(), 2)]);
        assert!(check_ranking_keys(&round, "p0", &ok).is_ok());

        let unknown = BTreeMap::from([("zz".to_string(), 1)]);
        assert!(matches!(
            check_ranking_keys(&round, "p0", &unknown),
            Err(ServiceError::InvalidInput(_))
        ));

        let own = BTreeMap::from([("t0".to_string(), 1)]);
        assert!(check_ranking_keys(&round, "p0", &own).is_err());
    }

    #[test]
    fn rankings_must_order_every_other_song_once() {
        let round = round_with_pool(3);
        let partial = BTreeMap::from([("t2".to_string(), 1)]);
        let tied = BTreeMap::from([
            ("t0".to_string(), 1),
            ("t1".to_string(), 1),
            ("t2".to_string(), 2),
        ]);
        let gap = BTreeMap::from([
            ("t0".to_string(), 1),
            ("t1".to_string(), 2),
            ("t2".to_string(), 4),
        ]);
        for rankings in [partial, tied, gap] {
            assert!(matches!(
                check_ranking_keys(&round, "spectator", &rankings),
                Err(ServiceError::InvalidInput(_))
            ));
        }

        let full = BTreeMap::from([
            ("t0".to_string(), 3),
            ("t1".to_string(), 1),
            ("t2".to_string(), 2),
        ]);
        assert!(check_ranking_keys(&round, "spectator", &full).is_ok());
    }

    #[test]
    fn current_round_requires_matching_phase() {
        let mut game = GameEntity {
            status: GameStatus::round(2, RoundPhase::Listening),
            player_count: 2,
            max_players: 6,
            current_round: 2,
            total_rounds: 3,
            creator_player_id: "a".into(),
            round_host_player_id: None,
            challenge: None,
            settings: GameSettingsEntity {
                rounds: 3,
                max_players: 6,
                allow_explicit: false,
                selection_time_limit: None,
                ranking_time_limit: None,
            },
            created_at: 0,
            started_at: None,
        };
        assert_eq!(current_round(&game, RoundPhase::Listening).unwrap(), 2);
        assert!(current_round(&game, RoundPhase::Ranking).is_err());

        game.status = GameStatus::Waiting;
        assert!(matches!(
            current_round(&game, RoundPhase::Listening),
            Err(ServiceError::InvalidState(_))
        ));
    }
}
