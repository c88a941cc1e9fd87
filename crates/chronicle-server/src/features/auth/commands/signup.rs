use serde::Deserialize;

use crate::audit::RequestContext;
use crate::features::users::commands::create::{self, CreateUserCommand, CreateUserError};
use crate::features::users::types::CreateUserInput;
use crate::features::FeatureState;

use super::super::jwt::TokenError;
use super::super::types::LoginResponse;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupCommand {
    pub input: CreateUserInput,
}

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error(transparent)]
    User(#[from] CreateUserError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[tracing::instrument(skip(state, ctx, command), fields(email = %command.input.email))]
pub async fn handle(
    state: &FeatureState,
    ctx: &RequestContext,
    command: SignupCommand,
) -> Result<LoginResponse, SignupError> {
    let user = create::handle(
        state,
        ctx,
        CreateUserCommand {
            input: command.input,
        },
    )
    .await?;

    let tokens = state.tokens.issue_pair(&user.id, &user.email)?;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user,
    })
}
