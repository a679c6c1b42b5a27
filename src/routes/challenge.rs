use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::challenge::{ChallengeDetailsQuery, PredefinedSongDto},
    error::{AppError, ErrorBody},
    services::challenge_service,
    state::SharedState,
};

/// Read-only access to the predefined challenges.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/challenges", get(get_predefined_challenges))
        .route("/challenges/details", get(get_challenge_details))
}

#[utoipa::path(
    get,
    path = "/challenges",
    tag = "challenge",
    responses((status = 200, description = "Challenge texts", body = [String]))
)]
/// List the texts of every predefined challenge.
pub async fn get_predefined_challenges(
    State(state): State<SharedState>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(challenge_service::get_predefined_challenges(&state).await?))
}

#[utoipa::path(
    get,
    path = "/challenges/details",
    tag = "challenge",
    params(("text" = String, Query, description = "Challenge text as listed by /challenges")),
    responses(
        (status = 200, description = "Curated songs", body = [PredefinedSongDto]),
        (status = 404, description = "Unknown challenge", body = ErrorBody)
    )
)]
/// Curated fallback songs of a challenge.
pub async fn get_challenge_details(
    State(state): State<SharedState>,
    Query(query): Query<ChallengeDetailsQuery>,
) -> Result<Json<Vec<PredefinedSongDto>>, AppError> {
    Ok(Json(
        challenge_service::get_challenge_details(&state, query).await?,
    ))
}
