//! Reactive entry point into scoring.
//!
//! Listens to every committed change and launches [`calculate_scores`] when a
//! round document moves into `scoring`. Failures are only logged; the admin
//! scoring route is the recovery path.

use std::str::FromStr;

use serde_json::Value;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    dao::{document_store::ChangeEvent, paths::DocTarget},
    services::scoring_service::calculate_scores,
    state::{SharedState, phase::RoundPhase},
};

/// Spawn the trigger loop on the runtime.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(run(state))
}

/// Follow the installed store, re-subscribing whenever it is replaced.
pub async fn run(state: SharedState) {
    let mut degraded = state.degraded_watcher();
    loop {
        let is_degraded = *degraded.borrow_and_update();
        if is_degraded {
            if degraded.changed().await.is_err() {
                return;
            }
            continue;
        }
        let Some(store) = state.store().await else {
            if degraded.changed().await.is_err() {
                return;
            }
            continue;
        };

        let mut changes = store.subscribe();
        info!("scoring trigger subscribed to store changes");
        loop {
            tokio::select! {
                changed = degraded.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("storage state changed; re-subscribing scoring trigger");
                    break;
                }
                received = changes.recv() => match received {
                    Ok(event) => handle_change(&state, &event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "scoring trigger lagged behind store changes");
                    }
                    Err(RecvError::Closed) => {
                        warn!("store change stream closed");
                        break;
                    }
                },
            }
        }
    }
}

/// Whether `event` moves a round document from any status into `scoring`.
pub fn entered_scoring(event: &ChangeEvent) -> bool {
    let phase = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .and_then(|raw| RoundPhase::from_str(raw).ok())
    };
    phase(event.after_field("status")) == Some(RoundPhase::Scoring)
        && phase(event.before_field("status")) != Some(RoundPhase::Scoring)
}

fn handle_change(state: &SharedState, event: &ChangeEvent) {
    let DocTarget::Round {
        game_id,
        round_number,
    } = event.path.target()
    else {
        return;
    };
    if !entered_scoring(event) {
        return;
    }

    let key = (game_id.to_owned(), round_number);
    if state.scoring_in_flight().insert(key.clone(), ()).is_some() {
        debug!(game_id, round = round_number, "scoring already running");
        return;
    }

    let state = state.clone();
    tokio::spawn(async move {
        let (game_id, round_number) = (&key.0, key.1);
        match state.repository().await {
            Ok(repository) => {
                if let Err(err) = calculate_scores(&repository, game_id, round_number).await {
                    error!(
                        game_id = %game_id,
                        round = round_number,
                        error = %err,
                        "automatic scoring failed"
                    );
                }
            }
            Err(err) => {
                error!(game_id = %game_id, round = round_number, error = %err, "scoring skipped");
            }
        }
        state.scoring_in_flight().remove(&key);
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::paths;

    fn round_event(before: Option<Value>, after: Option<Value>) -> ChangeEvent {
        ChangeEvent {
            path: paths::round("G", 1),
            before,
            after,
        }
    }

    #[test]
    fn detects_transition_into_scoring_only() {
        assert!(entered_scoring(&round_event(
            Some(json!({"status": "ranking"})),
            Some(json!({"status": "scoring"})),
        )));
        assert!(entered_scoring(&round_event(
            None,
            Some(json!({"status": "scoring"})),
        )));
        assert!(!entered_scoring(&round_event(
            Some(json!({"status": "scoring"})),
            Some(json!({"status": "scoring", "isPlaying": false})),
        )));
        assert!(!entered_scoring(&round_event(
            Some(json!({"status": "scoring"})),
            Some(json!({"status": "finished"})),
        )));
    }
}
