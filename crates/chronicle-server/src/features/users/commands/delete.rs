use serde::{Deserialize, Serialize};

use crate::audit::RequestContext;
use crate::features::FeatureState;
use crate::store::{Document, Filter, StoreError, UpdateSpec};

use super::super::types::{User, UserStatus};

/// Soft delete: the account is marked `DELETED` and keeps its history; the
/// document itself stays in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftDeleteUserCommand {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SoftDeleteUserError {
    #[error("A user id is required")]
    IdRequired,
    #[error("User '{0}' not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SoftDeleteUserCommand {
    pub fn validate(&self) -> Result<(), SoftDeleteUserError> {
        if self.id.trim().is_empty() {
            return Err(SoftDeleteUserError::IdRequired);
        }
        Ok(())
    }
}

#[tracing::instrument(skip(state, ctx), fields(user_id = %command.id))]
pub async fn handle(
    state: &FeatureState,
    ctx: &RequestContext,
    command: SoftDeleteUserCommand,
) -> Result<User, SoftDeleteUserError> {
    command.validate()?;

    let mut fields = Document::new();
    fields.insert(
        "status".to_string(),
        serde_json::to_value(UserStatus::Deleted)?,
    );

    let updated = state
        .users
        .find_one_and_update(ctx, &Filter::by_id(&command.id), &UpdateSpec::set(fields))
        .await?
        .ok_or_else(|| SoftDeleteUserError::NotFound(command.id.clone()))?;

    tracing::info!(user_id = %command.id, "User soft-deleted");

    Ok(User::from_document(updated)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_id() {
        let cmd = SoftDeleteUserCommand {
            id: "  ".to_string(),
        };
        assert!(matches!(cmd.validate(), Err(SoftDeleteUserError::IdRequired)));
    }
}
