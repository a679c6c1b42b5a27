use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};

use crate::{
    dto::{
        game::{ActionResponse, GameCode},
        round::{
            NominationRequest, PlaybackRequest, RankingRequest, RoundView, SetChallengeRequest,
            SubmissionResponse, TrackSearchQuery,
        },
    },
    error::{AppError, ErrorBody},
    services::{
        catalog::Track,
        identity::CallerIdentity,
        round_service::{self, NextRound},
    },
    state::SharedState,
};

/// Round phase routes driven by the host and the players.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/{game_id}/rounds/next", post(start_next_round))
        .route("/games/{game_id}/rounds/{round_id}", get(get_round))
        .route(
            "/games/{game_id}/rounds/{round_id}/challenge",
            put(set_challenge),
        )
        .route("/games/{game_id}/selection", post(start_selection_phase))
        .route("/games/{game_id}/nominations", post(submit_song_nomination))
        .route("/games/{game_id}/ranking", post(start_ranking_phase))
        .route("/games/{game_id}/playback", post(control_playback))
        .route("/games/{game_id}/rankings", post(submit_ranking))
        .route("/games/{game_id}/tracks", get(search_music_tracks))
}

#[utoipa::path(
    get,
    path = "/games/{game_id}/rounds/{round_id}",
    tag = "round",
    params(
        ("game_id" = String, Path, description = "Six character game code"),
        ("round_id" = u32, Path, description = "Round number, starting at 1")
    ),
    responses(
        (status = 200, description = "Round", body = RoundView),
        (status = 404, description = "No such round", body = ErrorBody)
    )
)]
/// Current round document; nominations stay anonymous until scoring.
pub async fn get_round(
    State(state): State<SharedState>,
    Path((game_id, round_id)): Path<(GameCode, u32)>,
) -> Result<Json<RoundView>, AppError> {
    Ok(Json(round_service::get_round(&state, &game_id, round_id).await?))
}

/// Set the challenge of an announcing round (host only, once).
#[utoipa::path(
    put,
    path = "/games/{game_id}/rounds/{round_id}/challenge",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of the round host"),
        ("game_id" = String, Path, description = "Six character game code"),
        ("round_id" = u32, Path, description = "Round number, starting at 1")
    ),
    request_body = SetChallengeRequest,
    responses(
        (status = 200, description = "Challenge set", body = ActionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 412, description = "Challenge already set or wrong phase", body = ErrorBody)
    )
)]
pub async fn set_challenge(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path((game_id, round_id)): Path<(GameCode, u32)>,
    Json(payload): Json<SetChallengeRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    round_service::set_challenge(&state, &caller, &game_id, round_id, payload).await?;
    Ok(Json(ActionResponse::new("challenge set")))
}

/// Open song selection (host only).
#[utoipa::path(
    post,
    path = "/games/{game_id}/selection",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of the round host"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    responses(
        (status = 200, description = "Selection started", body = ActionResponse),
        (status = 412, description = "Wrong phase or missing challenge", body = ErrorBody)
    )
)]
pub async fn start_selection_phase(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
) -> Result<Json<ActionResponse>, AppError> {
    round_service::start_selection_phase(&state, &caller, &game_id).await?;
    Ok(Json(ActionResponse::new("selection started")))
}

/// Nominate a song for the current round.
#[utoipa::path(
    post,
    path = "/games/{game_id}/nominations",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of a player"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    request_body = NominationRequest,
    responses(
        (status = 200, description = "Nomination recorded", body = SubmissionResponse),
        (status = 409, description = "Player already nominated", body = ErrorBody),
        (status = 412, description = "Round is not selecting songs", body = ErrorBody)
    )
)]
pub async fn submit_song_nomination(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
    Json(payload): Json<NominationRequest>,
) -> Result<Json<SubmissionResponse>, AppError> {
    Ok(Json(
        round_service::submit_song_nomination(&state, &caller, &game_id, payload).await?,
    ))
}

/// Move from listening to ranking (host only).
#[utoipa::path(
    post,
    path = "/games/{game_id}/ranking",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of the round host"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    responses(
        (status = 200, description = "Ranking started", body = ActionResponse),
        (status = 412, description = "Round is not listening", body = ErrorBody)
    )
)]
pub async fn start_ranking_phase(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
) -> Result<Json<ActionResponse>, AppError> {
    round_service::start_ranking_phase(&state, &caller, &game_id).await?;
    Ok(Json(ActionResponse::new("ranking started")))
}

/// Play, pause or move through the pool (host only).
#[utoipa::path(
    post,
    path = "/games/{game_id}/playback",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of the round host"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    request_body = PlaybackRequest,
    responses(
        (status = 200, description = "Playback updated", body = ActionResponse),
        (status = 412, description = "Round is not listening", body = ErrorBody)
    )
)]
pub async fn control_playback(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
    Json(payload): Json<PlaybackRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    round_service::control_playback(&state, &caller, &game_id, payload).await?;
    Ok(Json(ActionResponse::new("playback updated")))
}

/// Rank the songs of the other players.
#[utoipa::path(
    post,
    path = "/games/{game_id}/rankings",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of a player"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    request_body = RankingRequest,
    responses(
        (status = 200, description = "Ranking recorded", body = SubmissionResponse),
        (status = 400, description = "Unknown track or own nomination ranked", body = ErrorBody),
        (status = 409, description = "Player already ranked", body = ErrorBody),
        (status = 412, description = "Round is not ranking", body = ErrorBody)
    )
)]
pub async fn submit_ranking(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
    Json(payload): Json<RankingRequest>,
) -> Result<Json<SubmissionResponse>, AppError> {
    Ok(Json(
        round_service::submit_ranking(&state, &caller, &game_id, payload).await?,
    ))
}

/// Open the next round, or finish the game after the last one (host only).
#[utoipa::path(
    post,
    path = "/games/{game_id}/rounds/next",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of the round host"),
        ("game_id" = String, Path, description = "Six character game code")
    ),
    responses(
        (status = 200, description = "Next round started or game finished", body = ActionResponse),
        (status = 412, description = "Current round is not finished", body = ErrorBody)
    )
)]
pub async fn start_next_round(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = match round_service::start_next_round(&state, &caller, &game_id).await? {
        NextRound::Started { round_number, .. } => format!("round {round_number} started"),
        NextRound::GameFinished => "game finished".to_string(),
    };
    Ok(Json(ActionResponse::new(message)))
}

/// Search the music catalog on behalf of a player.
#[utoipa::path(
    get,
    path = "/games/{game_id}/tracks",
    tag = "round",
    params(
        ("x-session-token" = String, Header, description = "Session token of a player"),
        ("game_id" = String, Path, description = "Six character game code"),
        ("query" = String, Query, description = "Free-text search"),
        ("allowExplicit" = Option<bool>, Query, description = "Further restrict explicit tracks")
    ),
    responses((status = 200, description = "Matching tracks", body = [Track]))
)]
pub async fn search_music_tracks(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(game_id): Path<GameCode>,
    Query(query): Query<TrackSearchQuery>,
) -> Result<Json<Vec<Track>>, AppError> {
    Ok(Json(
        round_service::search_music_tracks(&state, &caller, &game_id, query).await?,
    ))
}
