use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::audit::RequestContext;
use crate::features::auth::password::{self, PasswordError};
use crate::features::FeatureState;
use crate::store::{Document, Filter, StoreError};

use super::super::types::{CreateUserInput, User, UserStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserCommand {
    pub input: CreateUserInput,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("First name must be between 2 and 20 characters")]
    FirstNameLength,
    #[error("Last name must be between 2 and 20 characters")]
    LastNameLength,
    #[error("A valid email address is required")]
    InvalidEmail,
    #[error("Password must be between 8 and 32 characters")]
    PasswordLength,
    #[error("Username cannot be empty or only whitespace")]
    UsernameEmpty,
    #[error("Phone cannot be empty or only whitespace")]
    PhoneEmpty,
    #[error("A user with this {0} already exists")]
    Duplicate(&'static str),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CreateUserCommand {
    pub fn validate(&self) -> Result<(), CreateUserError> {
        let input = &self.input;
        if !(2..=20).contains(&input.first_name.trim().chars().count()) {
            return Err(CreateUserError::FirstNameLength);
        }
        if !(2..=20).contains(&input.last_name.trim().chars().count()) {
            return Err(CreateUserError::LastNameLength);
        }
        if !is_plausible_email(input.email.trim()) {
            return Err(CreateUserError::InvalidEmail);
        }
        if !(8..=32).contains(&input.password.chars().count()) {
            return Err(CreateUserError::PasswordLength);
        }
        if let Some(ref username) = input.username {
            if username.trim().is_empty() {
                return Err(CreateUserError::UsernameEmpty);
            }
        }
        if let Some(ref phone) = input.phone {
            if phone.trim().is_empty() {
                return Err(CreateUserError::PhoneEmpty);
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(state, ctx, command), fields(email = %command.input.email))]
pub async fn handle(
    state: &FeatureState,
    ctx: &RequestContext,
    command: CreateUserCommand,
) -> Result<User, CreateUserError> {
    command.validate()?;
    let input = command.input;

    let email = input.email.trim().to_lowercase();
    // Signup does not carry a username; fall back to the email address.
    let username = input
        .username
        .as_deref()
        .map(|name| name.trim().to_lowercase())
        .unwrap_or_else(|| email.clone());
    let phone = input.phone.as_deref().map(str::trim).map(str::to_string);

    ensure_unique(state, "email", &email).await?;
    ensure_unique(state, "username", &username).await?;
    if let Some(ref phone) = phone {
        ensure_unique(state, "phone", phone).await?;
    }

    let hash = password::hash_password(&input.password)?;

    let mut doc = Document::new();
    doc.insert(
        "firstName".to_string(),
        JsonValue::String(input.first_name.trim().to_string()),
    );
    doc.insert(
        "lastName".to_string(),
        JsonValue::String(input.last_name.trim().to_string()),
    );
    doc.insert("email".to_string(), JsonValue::String(email));
    doc.insert("username".to_string(), JsonValue::String(username));
    if let Some(phone) = phone {
        doc.insert("phone".to_string(), JsonValue::String(phone));
    }
    doc.insert("password".to_string(), JsonValue::String(hash));
    doc.insert("gender".to_string(), serde_json::to_value(input.gender)?);
    doc.insert(
        "status".to_string(),
        serde_json::to_value(input.status.unwrap_or(UserStatus::Pending))?,
    );

    let stored = state.users.insert_one(ctx, doc).await?;

    tracing::info!(
        user_id = ?stored.get("_id"),
        "User created"
    );

    Ok(User::from_document(stored)?)
}

async fn ensure_unique(
    state: &FeatureState,
    field: &'static str,
    value: &str,
) -> Result<(), CreateUserError> {
    let mut clauses = serde_json::Map::new();
    clauses.insert(field.to_string(), JsonValue::String(value.to_string()));
    let existing = state
        .users
        .find_one(&Filter::new(clauses), Some(&["_id".to_string()]))
        .await?;
    if existing.is_some() {
        return Err(CreateUserError::Duplicate(field));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
