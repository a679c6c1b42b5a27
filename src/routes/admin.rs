use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use tracing::warn;

use crate::{
    dto::{
        challenge::{SeedChallengeRequest, SeedChallengeResponse},
        game::GameCode,
        round::ScoresResponse,
    },
    error::{AppError, ErrorBody, ServiceError},
    services::{challenge_service, scoring_service},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Operator endpoints: manual scoring and challenge seeding.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/admin/games/{game_id}/rounds/{round_number}/scores",
            post(calculate_scores),
        )
        .route("/admin/challenges", post(seed_challenge))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Score a round stuck in `scoring`.
#[utoipa::path(
    post,
    path = "/admin/games/{game_id}/rounds/{round_number}/scores",
    tag = "admin",
    params(
        ("x-admin-token" = String, Header, description = "Configured admin token"),
        ("game_id" = String, Path, description = "Six character game code"),
        ("round_number" = u32, Path, description = "Round to score")
    ),
    responses(
        (status = 200, description = "Round scored", body = ScoresResponse),
        (status = 412, description = "Round is not waiting for scores", body = ErrorBody)
    )
)]
pub async fn calculate_scores(
    State(state): State<SharedState>,
    Path((game_id, round_number)): Path<(GameCode, u32)>,
) -> Result<Json<ScoresResponse>, AppError> {
    let repository = state.repository().await?;
    let scoring = scoring_service::calculate_scores(&repository, &game_id, round_number).await?;
    Ok(Json(ScoresResponse {
        results: scoring.results.into_iter().map(Into::into).collect(),
        winner_data: scoring.winners.into(),
    }))
}

/// Create or refresh a challenge from the music catalog.
#[utoipa::path(
    post,
    path = "/admin/challenges",
    tag = "admin",
    params(("x-admin-token" = String, Header, description = "Configured admin token")),
    request_body = SeedChallengeRequest,
    responses((status = 200, description = "Challenge stored", body = SeedChallengeResponse))
)]
pub async fn seed_challenge(
    State(state): State<SharedState>,
    Json(payload): Json<SeedChallengeRequest>,
) -> Result<Json<SeedChallengeResponse>, AppError> {
    Ok(Json(challenge_service::seed_challenge(&state, payload).await?))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config().admin_token.as_deref() else {
        warn!("admin route called but no admin token is configured");
        return Err(ServiceError::PermissionDenied("admin routes are disabled".into()).into());
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!("missing admin token header `{ADMIN_TOKEN_HEADER}`"))
        })?;

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        Err(ServiceError::Unauthorized("invalid admin token".into()).into())
    }
}
