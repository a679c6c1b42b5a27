use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    dao::{document_store::ChangeEvent, models::RoundEntity, paths::DocTarget},
    dto::{
        round::RoundView,
        sse::{DocumentChange, Handshake, ServerEvent},
    },
    error::ServiceError,
    services::game_service::load_game,
    state::SharedState,
};

/// Subscribe to the changes of an existing game.
pub async fn subscribe_game(
    state: &SharedState,
    game_id: &str,
) -> Result<broadcast::Receiver<ChangeEvent>, ServiceError> {
    let repository = state.repository().await?;
    load_game(&repository, None, game_id).await?;
    Ok(repository.store().subscribe())
}

/// Greeting sent first on every game stream.
pub fn handshake(state: &SharedState, game_id: &str) -> Option<ServerEvent> {
    ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            game_id: game_id.to_owned(),
            message: "subscribed to game events".into(),
            degraded: state.is_degraded(),
        },
    )
    .ok()
}

/// Map a store change to the SSE event sent to the clients of `game_id`.
///
/// Sessions, challenges and other games are never forwarded; ranking
/// contents stay private and only announce who submitted.
pub fn to_server_event(game_id: &str, change: &ChangeEvent) -> Option<ServerEvent> {
    if change.path.game_id() != Some(game_id) {
        return None;
    }
    let after = change.after.clone().unwrap_or(Value::Null);

    let (name, data) = match change.path.target() {
        DocTarget::Game { .. } => ("game.updated", after),
        DocTarget::Player { .. } => ("player.updated", after),
        DocTarget::Round { .. } => {
            let round: RoundEntity = serde_json::from_value(after).ok()?;
            ("round.updated", serde_json::to_value(RoundView::from(round)).ok()?)
        }
        DocTarget::Ranking { .. } if change.before.is_none() => {
            ("ranking.created", Value::Object(Default::default()))
        }
        DocTarget::Score { .. } => ("score.created", after),
        _ => return None,
    };

    ServerEvent::json(
        Some(name.to_string()),
        &DocumentChange {
            path: change.path.to_string(),
            id: change.path.id().to_owned(),
            data,
        },
    )
    .ok()
}

/// Convert a store subscription into an SSE response filtered on one game,
/// forwarding events until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    game_id: String,
    greeting: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(greeting) = greeting {
            if tx.send(Ok(to_event(greeting))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(change) => {
                            let Some(payload) = to_server_event(&game_id, &change) else {
                                continue;
                            };
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(game_id = %game_id, skipped, "game stream lagged; events dropped");
                        }
                    }
                }
            }
        }

        debug!(game_id = %game_id, "game SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::paths;

    fn change(path: paths::DocPath, before: Option<Value>, after: Value) -> ChangeEvent {
        ChangeEvent {
            path,
            before,
            after: Some(after),
        }
    }

    #[test]
    fn filters_other_games_and_sessions() {
        let other = change(paths::game("OTHER"), None, json!({"status": "waiting"}));
        assert!(to_server_event("GAME01", &other).is_none());

        let session = change(paths::session("tok"), None, json!({"gameId": "GAME01"}));
        assert!(to_server_event("GAME01", &session).is_none());

        let game = change(paths::game("GAME01"), None, json!({"status": "waiting"}));
        let event = to_server_event("GAME01", &game).unwrap();
        assert_eq!(event.event.as_deref(), Some("game.updated"));
        assert!(event.data.contains("\"path\":\"games/GAME01\""));
    }

    #[test]
    fn rankings_only_announce_the_submitter() {
        let ranking = change(
            paths::ranking("GAME01", 1, "p1"),
            None,
            json!({"rankings": {"t1": 1}, "submittedAt": 0}),
        );
        let event = to_server_event("GAME01", &ranking).unwrap();
        assert_eq!(event.event.as_deref(), Some("ranking.created"));
        assert!(!event.data.contains("t1"));
        assert!(event.data.contains("\"id\":\"p1\""));
    }

    #[test]
    fn rounds_are_sent_as_views() {
        let round = RoundEntity::announcing(2, "host".into(), 0);
        let event = to_server_event(
            "GAME01",
            &change(
                paths::round("GAME01", 2),
                None,
                serde_json::to_value(&round).unwrap(),
            ),
        )
        .unwrap();
        assert_eq!(event.event.as_deref(), Some("round.updated"));
        assert!(event.data.contains("\"nominatedPlayerIds\":[]"));
    }
}
