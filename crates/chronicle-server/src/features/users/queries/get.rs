use serde::Deserialize;

use crate::features::FeatureState;
use crate::store::StoreError;

use super::super::types::{GetUserInput, User};

#[derive(Debug, Clone, Deserialize)]
pub struct GetUserQuery {
    pub input: GetUserInput,
}

#[derive(Debug, thiserror::Error)]
pub enum GetUserError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[tracing::instrument(skip(state, query))]
pub async fn handle(
    state: &FeatureState,
    query: GetUserQuery,
) -> Result<Option<User>, GetUserError> {
    let found = state
        .users
        .find_one(&query.input.to_filter(), None)
        .await?;

    match found {
        Some(doc) => Ok(Some(User::from_document(doc)?)),
        None => Ok(None),
    }
}
