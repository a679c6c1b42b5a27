use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{dto::game::GameCode, error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/games/{game_id}/events",
    tag = "sse",
    params(("game_id" = String, Path, description = "Six character game code")),
    responses((status = 200, description = "Game change stream", content_type = "text/event-stream", body = String))
)]
/// Stream `game.updated`, `player.updated`, `round.updated`, `ranking.created`
/// and `score.created` events of one game.
pub async fn game_stream(
    State(state): State<SharedState>,
    Path(game_id): Path<GameCode>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = sse_service::subscribe_game(&state, &game_id).await?;
    info!(game_id = %game_id, "new game SSE connection");
    let greeting = sse_service::handshake(&state, &game_id);
    Ok(sse_service::to_sse_stream(receiver, game_id.to_string(), greeting))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/games/{game_id}/events", get(game_stream))
}
