use serde::Deserialize;

use crate::features::users::types::User;
use crate::features::FeatureState;
use crate::store::{Filter, StoreError};

use super::super::jwt::TokenError;
use super::super::types::{LoginResponse, RefreshTokenInput};

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenCommand {
    pub input: RefreshTokenInput,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenError {
    /// Expired, unparseable, or pointing at a user that no longer exists.
    #[error("Invalid refresh token")]
    InvalidToken,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[tracing::instrument(skip(state, command))]
pub async fn handle(
    state: &FeatureState,
    command: RefreshTokenCommand,
) -> Result<LoginResponse, RefreshTokenError> {
    let claims = state
        .tokens
        .verify_refresh(&command.input.refresh_token)
        .map_err(|_| RefreshTokenError::InvalidToken)?;

    let doc = state
        .users
        .find_one(&Filter::by_id(&claims.sub), None)
        .await?
        .ok_or(RefreshTokenError::InvalidToken)?;

    let user = User::from_document(doc)?;
    let tokens = state.tokens.issue_pair(&user.id, &user.email)?;

    tracing::debug!(user_id = %user.id, "Refreshed token pair");

    Ok(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user,
    })
}
