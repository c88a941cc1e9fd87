use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::audit::RequestContext;
use crate::features::auth::password::{self, PasswordError};
use crate::features::FeatureState;
use crate::store::{Document, Filter, StoreError, UpdateSpec};

use super::super::types::{UpdateUserInput, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserCommand {
    pub input: UpdateUserInput,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateUserError {
    #[error("At least one field must be provided for update")]
    NoFieldsToUpdate,
    #[error("First name must be between 2 and 20 characters")]
    FirstNameLength,
    #[error("Last name must be between 2 and 20 characters")]
    LastNameLength,
    #[error("A valid email address is required")]
    InvalidEmail,
    #[error("Password must be between 8 and 32 characters")]
    PasswordLength,
    #[error("User '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UpdateUserCommand {
    pub fn validate(&self) -> Result<(), UpdateUserError> {
        let input = &self.input;
        if input.first_name.is_none()
            && input.last_name.is_none()
            && input.email.is_none()
            && input.username.is_none()
            && input.phone.is_none()
            && input.password.is_none()
            && input.gender.is_none()
            && input.status.is_none()
        {
            return Err(UpdateUserError::NoFieldsToUpdate);
        }
        if let Some(ref first_name) = input.first_name {
            if !(2..=20).contains(&first_name.trim().chars().count()) {
                return Err(UpdateUserError::FirstNameLength);
            }
        }
        if let Some(ref last_name) = input.last_name {
            if !(2..=20).contains(&last_name.trim().chars().count()) {
                return Err(UpdateUserError::LastNameLength);
            }
        }
        if let Some(ref email) = input.email {
            if !email.contains('@') || email.trim().is_empty() {
                return Err(UpdateUserError::InvalidEmail);
            }
        }
        if let Some(ref pass) = input.password {
            if !(8..=32).contains(&pass.chars().count()) {
                return Err(UpdateUserError::PasswordLength);
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(state, ctx, command), fields(user_id = %command.input.id))]
pub async fn handle(
    state: &FeatureState,
    ctx: &RequestContext,
    command: UpdateUserCommand,
) -> Result<User, UpdateUserError> {
    command.validate()?;
    let input = command.input;

    let mut fields = Document::new();
    if let Some(first_name) = input.first_name {
        fields.insert(
            "firstName".to_string(),
            JsonValue::String(first_name.trim().to_string()),
        );
    }
    if let Some(last_name) = input.last_name {
        fields.insert(
            "lastName".to_string(),
            JsonValue::String(last_name.trim().to_string()),
        );
    }
    if let Some(email) = input.email {
        fields.insert(
            "email".to_string(),
            JsonValue::String(email.trim().to_lowercase()),
        );
    }
    if let Some(username) = input.username {
        fields.insert(
            "username".to_string(),
            JsonValue::String(username.trim().to_lowercase()),
        );
    }
    if let Some(phone) = input.phone {
        fields.insert("phone".to_string(), JsonValue::String(phone.trim().to_string()));
    }
    if let Some(password) = input.password {
        let hash = password::hash_password(&password)?;
        fields.insert("password".to_string(), JsonValue::String(hash));
    }
    if let Some(gender) = input.gender {
        fields.insert("gender".to_string(), serde_json::to_value(gender)?);
    }
    if let Some(status) = input.status {
        fields.insert("status".to_string(), serde_json::to_value(status)?);
    }

    let updated = state
        .users
        .find_one_and_update(ctx, &Filter::by_id(&input.id), &UpdateSpec::set(fields))
        .await?
        .ok_or_else(|| UpdateUserError::NotFound(input.id.clone()))?;

    tracing::info!(user_id = %input.id, "User updated");

    Ok(User::from_document(updated)?)
}
