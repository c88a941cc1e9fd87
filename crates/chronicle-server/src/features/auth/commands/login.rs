use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::features::users::types::User;
use crate::features::FeatureState;
use crate::store::{Filter, StoreError};

use super::super::jwt::TokenError;
use super::super::password;
use super::super::types::{LoginInput, LoginResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCommand {
    pub input: LoginInput,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Covers both unknown email and wrong password; the response does not
    /// reveal which.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[tracing::instrument(skip(state, command))]
pub async fn handle(state: &FeatureState, command: LoginCommand) -> Result<LoginResponse, LoginError> {
    let email = command.input.email.trim().to_lowercase();

    let mut clauses = serde_json::Map::new();
    clauses.insert("email".to_string(), JsonValue::String(email));

    let doc = state
        .users
        .find_one(&Filter::new(clauses), None)
        .await?
        .ok_or(LoginError::InvalidCredentials)?;

    let hash = doc
        .get("password")
        .and_then(JsonValue::as_str)
        .ok_or(LoginError::InvalidCredentials)?;
    if !password::verify_password(hash, &command.input.password) {
        return Err(LoginError::InvalidCredentials);
    }

    let user = User::from_document(doc)?;
    let tokens = state.tokens.issue_pair(&user.id, &user.email)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user,
    })
}
