use serde::Deserialize;

use crate::features::FeatureState;
use crate::store::StoreError;

use super::super::types::{PaginateUserInput, PaginatedUsers, User};

/// Default page size when the request does not name one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Upper bound on requested page sizes.
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct ListUsersQuery {
    pub input: PaginateUserInput,
}

#[derive(Debug, thiserror::Error)]
pub enum ListUsersError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[tracing::instrument(skip(state, query))]
pub async fn handle(
    state: &FeatureState,
    query: ListUsersQuery,
) -> Result<PaginatedUsers, ListUsersError> {
    let page = query.input.page.unwrap_or(1).max(1);
    let limit = query
        .input
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let filter = query.input.to_filter();
    let total_docs = state.users.count(&filter).await?;
    let raw = state
        .users
        .find_many(&filter, (page - 1) * limit, limit)
        .await?;

    let docs = raw
        .into_iter()
        .map(User::from_document)
        .collect::<Result<Vec<_>, _>>()?;

    let total_pages = total_docs.div_ceil(limit).max(1);

    Ok(PaginatedUsers {
        docs,
        total_docs,
        page,
        limit,
        total_pages,
        has_prev_page: page > 1,
        has_next_page: page < total_pages,
    })
}
