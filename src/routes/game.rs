use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};

use crate::{
    dto::game::{
        ActionResponse, CreateGameRequest, GameCode, GameSettingsDto, GameView, JoinGameRequest,
        SessionResponse,
    },
    error::{AppError, ErrorBody},
    services::{game_service, identity::CallerIdentity},
    state::SharedState,
};

/// Lobby routes: creation, joining, start and settings.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/join", post(join_game))
        .route("/games/{game_id}", get(get_game))
        .route("/games/{game_id}/start", post(start_game))
        .route("/games/{game_id}/settings", put(update_game_settings))
}

/// Open a new lobby; the caller becomes its creator.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    request_body = CreateGameRequest,
    responses(
        (status = 201, description = "Game created", body = SessionResponse),
        (status = 400, description = "Invalid name or round count", body = ErrorBody)
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Json(payload): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let session = game_service::create_game(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Join a lobby by id, or the oldest lobby with a free seat.
#[utoipa::path(
    post,
    path = "/games/join",
    tag = "game",
    request_body = JoinGameRequest,
    responses(
        (status = 200, description = "Joined", body = SessionResponse),
        (status = 404, description = "No such game", body = ErrorBody),
        (status = 409, description = "Name already taken", body = ErrorBody),
        (status = 412, description = "Game already started", body = ErrorBody),
        (status = 429, description = "Game is full", body = ErrorBody)
    )
)]
pub async fn join_game(
    State(state): State<SharedState>,
    Json(payload): Json<JoinGameRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(game_service::join_game(&state, payload).await?))
}

#[utoipa::path(
    get,
    path = "/games/{game_id}",
    tag = "game",
    params(("game_id" = String, Path, description = "Six character game code")),
    responses(
        (status = 200, description = "Game and players", body = GameView),
        (status = 404, description = "No such game", body = ErrorBody)
    )
)]
/// Current game document with its players in join order.
pub async fn get_game(
    State(state): State<SharedState>,
    Path(game_id): Path<GameCode>,
) -> Result<Json<GameView>, AppError> {
    Ok(Json(game_service::get_game(&state, &game_id).await?))
}

/// Start the game and open round one.
#[utoipa::path(
    post,
    path = "/games/{game_id}/start",
    tag = "game",
    params(
        ("x-session-token" = String, Header, description = "Session token of a player of the game"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    responses(
        (status = 200, description = "Game started", body = ActionResponse),
        (status = 412, description = "Already started or not enough players", body = ErrorBody)
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
) -> Result<Json<ActionResponse>, AppError> {
    game_service::start_game(&state, &caller, &game_id).await?;
    Ok(Json(ActionResponse::new("game started")))
}

/// Replace the lobby settings (creator only).
#[utoipa::path(
    put,
    path = "/games/{game_id}/settings",
    tag = "game",
    params(
        ("x-session-token" = String, Header, description = "Session token of the creator"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    request_body = GameSettingsDto,
    responses(
        (status = 200, description = "Settings saved", body = ActionResponse),
        (status = 403, description = "Caller is not the creator", body = ErrorBody),
        (status = 412, description = "Game already started", body = ErrorBody)
    )
)]
pub async fn update_game_settings(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
    Json(payload): Json<GameSettingsDto>,
) -> Result<Json<ActionResponse>, AppError> {
    game_service::update_game_settings(&state, &caller, &game_id, payload).await?;
    Ok(Json(ActionResponse::new("settings updated")))
}
