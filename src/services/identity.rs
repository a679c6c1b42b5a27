//! Session-token identity of the caller.

use uuid::Uuid;

use crate::{dao::repository::GameRepository, dto::game::normalize_game_id, error::ServiceError};

/// Player bound to the session token presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub game_id: String,
    pub player_id: String,
}

impl CallerIdentity {
    /// Look up the session stored for `token`.
    pub async fn resolve(repository: &GameRepository, token: &str) -> Result<Self, ServiceError> {
        let session = repository
            .get_session(None, token)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("unknown session token".into()))?;
        Ok(Self {
            game_id: session.game_id,
            player_id: session.player_id,
        })
    }

    /// Reject callers whose session belongs to another game.
    pub fn ensure_game(&self, game_id: &str) -> Result<(), ServiceError> {
        if self.game_id == normalize_game_id(game_id) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "session is not bound to game `{game_id}`"
            )))
        }
    }
}

/// Fresh opaque session token.
pub fn new_session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dao::{document_store::memory::MemoryStore, models::SessionEntity};

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let repository = GameRepository::new(Arc::new(MemoryStore::new()));
        let token = new_session_token();
        repository
            .create_session(
                None,
                &token,
                &SessionEntity {
                    game_id: "ABC123".into(),
                    player_id: "p1".into(),
                    created_at: 0,
                },
            )
            .await
            .unwrap();

        let caller = CallerIdentity::resolve(&repository, &token).await.unwrap();
        assert_eq!(caller.player_id, "p1");
        assert!(caller.ensure_game("ABC123").is_ok());
        assert!(caller.ensure_game(" abc123").is_ok());
        assert!(matches!(
            caller.ensure_game("ZZZ999"),
            Err(ServiceError::PermissionDenied(_))
        ));

        let err = CallerIdentity::resolve(&repository, "nope").await.unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }
}
