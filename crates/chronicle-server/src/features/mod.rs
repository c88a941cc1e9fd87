//! Feature modules implementing the Chronicle API
//!
//! Each feature is a vertical slice with its own commands (write operations,
//! all routed through the audited collection so every mutation lands in the
//! activity log) and queries (read operations, uninstrumented).
//!
//! - **users**: account CRUD with pagination and soft delete
//! - **auth**: signup, login, and token refresh

pub mod auth;
pub mod users;

use std::sync::Arc;

use crate::audit::{AuditSink, AuditedCollection};
use auth::jwt::TokenService;

/// Shared state handed to every command and query handler.
#[derive(Clone)]
pub struct FeatureState {
    /// The `users` collection, instrumented for activity logging
    pub users: AuditedCollection,
    /// Read side of the audit trail
    pub audit: Arc<dyn AuditSink>,
    /// JWT issuance and verification
    pub tokens: TokenService,
}
