use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::{AppError, ServiceError},
    services::identity::CallerIdentity,
    state::SharedState,
};

/// Header carrying the session token issued on create and join.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

impl FromRequestParts<SharedState> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(SESSION_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ServiceError::Unauthorized(format!(
                    "missing session token header `{SESSION_TOKEN_HEADER}`"
                ))
            })?;

        let repository = state.repository().await?;
        Ok(CallerIdentity::resolve(&repository, token).await?)
    }
}
