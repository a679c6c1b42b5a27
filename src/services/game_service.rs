use rand::Rng;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        document_store::{Transaction, run_in_transaction},
        models::{GameEntity, GameSettingsEntity, PlayerEntity, RoundEntity, SessionEntity},
        repository::{GamePatch, GameRepository},
    },
    dto::game::{
        CreateGameRequest, DEFAULT_TOTAL_ROUNDS, GameSettingsDto, GameView, JoinGameRequest,
        SessionResponse, normalize_game_id,
    },
    error::ServiceError,
    services::{
        identity::{CallerIdentity, new_session_token},
        now_millis, random_index,
    },
    state::{
        SharedState,
        phase::{GameStatus, RoundPhase},
    },
};

/// Players required before the creator can start.
pub const MIN_PLAYERS_TO_START: u32 = 2;
const GAME_ID_LENGTH: usize = 6;
const GAME_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Waiting games fetched per page when joining without a game id.
const OPEN_GAME_PAGE_SIZE: usize = 20;

/// Open a new lobby and register its creator.
pub async fn create_game(
    state: &SharedState,
    request: CreateGameRequest,
) -> Result<SessionResponse, ServiceError> {
    request.validate()?;
    let repository = state.repository().await?;

    let defaults = &state.config().default_settings;
    let total_rounds = request.total_rounds.unwrap_or(DEFAULT_TOTAL_ROUNDS);
    let now = now_millis();
    let game_id = generate_game_id();
    let player_id = Uuid::new_v4().to_string();
    let token = new_session_token();

    let game = GameEntity {
        status: GameStatus::Waiting,
        player_count: 1,
        max_players: defaults.max_players,
        current_round: 0,
        total_rounds,
        creator_player_id: player_id.clone(),
        round_host_player_id: None,
        challenge: None,
        settings: GameSettingsEntity {
            rounds: total_rounds,
            max_players: defaults.max_players,
            allow_explicit: defaults.allow_explicit,
            selection_time_limit: defaults.selection_time_limit,
            ranking_time_limit: defaults.ranking_time_limit,
        },
        created_at: now,
        started_at: None,
    };
    let creator = PlayerEntity {
        name: request.player_name.trim().to_owned(),
        score: 0,
        has_joined: true,
        joker_available: true,
        is_creator: true,
        joined_at: now,
    };
    let session = SessionEntity {
        game_id: game_id.clone(),
        player_id: player_id.clone(),
        created_at: now,
    };

    run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let (game_id, player_id, token) = (game_id.clone(), player_id.clone(), token.clone());
        let (game, creator, session) = (game.clone(), creator.clone(), session.clone());
        async move {
            if repository.get_game(Some(&tx), &game_id).await?.is_some() {
                return Err(ServiceError::AlreadyExists(format!(
                    "game `{game_id}` already exists"
                )));
            }
            repository.create_game(Some(&tx), &game_id, &game).await?;
            repository
                .create_player(Some(&tx), &game_id, &player_id, &creator)
                .await?;
            repository.create_session(Some(&tx), &token, &session).await?;
            Ok::<_, ServiceError>(())
        }
    })
    .await?;

    info!(game_id = %game_id, player_id = %player_id, total_rounds, "game created");
    Ok(SessionResponse {
        game_id,
        player_id,
        session_token: token,
    })
}

/// Join the given lobby, or the oldest one with a free seat.
pub async fn join_game(
    state: &SharedState,
    request: JoinGameRequest,
) -> Result<SessionResponse, ServiceError> {
    request.validate()?;
    let repository = state.repository().await?;

    let game_id = match request.game_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => normalize_game_id(id),
        _ => find_open_game(&repository).await?,
    };
    let name = request.player_name.trim().to_owned();
    let player_id = Uuid::new_v4().to_string();
    let token = new_session_token();

    run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let (game_id, player_id, token, name) = (
            game_id.clone(),
            player_id.clone(),
            token.clone(),
            name.clone(),
        );
        async move {
            let game = repository
                .get_game(Some(&tx), &game_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;
            if game.status != GameStatus::Waiting {
                return Err(ServiceError::InvalidState(format!(
                    "game `{game_id}` is not accepting players ({})",
                    game.status
                )));
            }
            if game.player_count >= game.settings.max_players {
                return Err(ServiceError::ResourceExhausted(format!(
                    "game `{game_id}` is full"
                )));
            }

            let players = repository.list_players(Some(&tx), &game_id).await?;
            if players.iter().any(|(_, player)| player.name == name) {
                return Err(ServiceError::AlreadyExists(format!(
                    "name `{name}` is already taken in game `{game_id}`"
                )));
            }

            let now = now_millis();
            repository
                .increment_player_count(Some(&tx), &game_id, 1)
                .await?;
            repository
                .create_player(
                    Some(&tx),
                    &game_id,
                    &player_id,
                    &PlayerEntity {
                        name,
                        score: 0,
                        has_joined: true,
                        joker_available: true,
                        is_creator: false,
                        joined_at: now,
                    },
                )
                .await?;
            repository
                .create_session(
                    Some(&tx),
                    &token,
                    &SessionEntity {
                        game_id: game_id.clone(),
                        player_id: player_id.clone(),
                        created_at: now,
                    },
                )
                .await?;
            Ok::<_, ServiceError>(())
        }
    })
    .await?;

    info!(game_id = %game_id, player_id = %player_id, "player joined");
    Ok(SessionResponse {
        game_id,
        player_id,
        session_token: token,
    })
}

/// Leave the lobby and open round one with a random host.
pub async fn start_game(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
) -> Result<(), ServiceError> {
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;

    let host = run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            if game.status != GameStatus::Waiting {
                return Err(ServiceError::InvalidState(format!(
                    "game `{game_id}` already started ({})",
                    game.status
                )));
            }
            if game.player_count < MIN_PLAYERS_TO_START {
                return Err(ServiceError::InvalidState(format!(
                    "at least {MIN_PLAYERS_TO_START} players are required to start"
                )));
            }

            let players = joined_players(repository.list_players(Some(&tx), game_id).await?);
            if players.is_empty() {
                return Err(ServiceError::InvalidState(format!(
                    "game `{game_id}` has no joined players"
                )));
            }
            let host = players[random_index(players.len())].0.clone();

            let now = now_millis();
            repository
                .update_game(
                    Some(&tx),
                    game_id,
                    &GamePatch {
                        status: Some(GameStatus::round(1, RoundPhase::Announcing)),
                        current_round: Some(1),
                        round_host_player_id: Some(host.clone()),
                        started_at: Some(now),
                        ..Default::default()
                    },
                )
                .await?;
            repository
                .create_round(
                    Some(&tx),
                    game_id,
                    &RoundEntity::announcing(1, host.clone(), now),
                )
                .await?;
            Ok::<_, ServiceError>(host)
        }
    })
    .await?;

    info!(game_id, host = %host, "game started");
    Ok(())
}

/// Replace the lobby settings; creator only, while waiting.
pub async fn update_game_settings(
    state: &SharedState,
    caller: &CallerIdentity,
    game_id: &str,
    settings: GameSettingsDto,
) -> Result<(), ServiceError> {
    settings.validate()?;
    caller.ensure_game(game_id)?;
    let repository = state.repository().await?;
    let settings = GameSettingsEntity::from(settings);

    run_in_transaction(repository.store(), |tx| {
        let repository = repository.clone();
        let settings = settings.clone();
        async move {
            let game = load_game(&repository, Some(&tx), game_id).await?;
            if game.creator_player_id != caller.player_id {
                return Err(ServiceError::PermissionDenied(
                    "only the creator can change the settings".into(),
                ));
            }
            if game.status != GameStatus::Waiting {
                return Err(ServiceError::InvalidState(
                    "settings are locked once the game has started".into(),
                ));
            }
            if settings.max_players < game.player_count {
                return Err(ServiceError::InvalidState(format!(
                    "{} players already joined, maxPlayers cannot be {}",
                    game.player_count, settings.max_players
                )));
            }

            repository
                .update_game(
                    Some(&tx),
                    game_id,
                    &GamePatch {
                        total_rounds: Some(settings.rounds),
                        max_players: Some(settings.max_players),
                        settings: Some(settings),
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, ServiceError>(())
        }
    })
    .await?;

    info!(game_id, "game settings updated");
    Ok(())
}

/// Game document with its joined players in join order.
pub async fn get_game(state: &SharedState, game_id: &str) -> Result<GameView, ServiceError> {
    let repository = state.repository().await?;
    let game = load_game(&repository, None, game_id).await?;
    let players = joined_players(repository.list_players(None, game_id).await?);
    Ok(GameView::new(game_id.to_owned(), game, players))
}

pub(crate) async fn load_game(
    repository: &GameRepository,
    tx: Option<&Transaction>,
    game_id: &str,
) -> Result<GameEntity, ServiceError> {
    repository
        .get_game(tx, game_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))
}

/// Joined players ordered by join time, then id.
pub(crate) fn joined_players(
    mut players: Vec<(String, PlayerEntity)>,
) -> Vec<(String, PlayerEntity)> {
    players.retain(|(_, player)| player.has_joined);
    players.sort_by(|(a_id, a), (b_id, b)| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a_id.cmp(b_id))
    });
    players
}

/// Oldest waiting game with a free seat, paging past full lobbies.
async fn find_open_game(repository: &GameRepository) -> Result<String, ServiceError> {
    let mut offset = 0;
    loop {
        let page = repository
            .find_waiting_games(offset, OPEN_GAME_PAGE_SIZE)
            .await?;
        let fetched = page.len();
        if let Some((id, _)) = page
            .into_iter()
            .find(|(_, game)| game.player_count < game.settings.max_players)
        {
            return Ok(id);
        }
        if fetched < OPEN_GAME_PAGE_SIZE {
            return Err(ServiceError::NotFound(
                "no open game is waiting for players".into(),
            ));
        }
        offset += fetched;
    }
}

fn generate_game_id() -> String {
    let mut rng = rand::rng();
    (0..GAME_ID_LENGTH)
        .map(|_| char::from(GAME_ID_ALPHABET[rng.random_range(0..GAME_ID_ALPHABET.len())]))
        .collect()
}
