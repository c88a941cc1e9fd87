//! Per-request context threaded into the audit layer
//!
//! The HTTP layer builds one [`RequestContext`] per logical request and
//! passes it explicitly through every service call; the fire-and-forget
//! recording task receives an owned clone so it can outlive the request.
//! Mutations triggered outside a request (background jobs, bootstrap code)
//! use [`RequestContext::background`].

use serde_json::Value as JsonValue;

/// Key under which GraphQL-style request bodies carry their variables.
pub const VARIABLES_KEY: &str = "variables";

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
}

/// Ambient data for one in-flight request, read-only to the audit layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The raw request body as received (an operation envelope for the
    /// GraphQL endpoint). Never mutated by the audit layer.
    pub body: serde_json::Map<String, JsonValue>,
    /// The authenticated user, when the request carried valid credentials.
    pub user: Option<UserIdentity>,
}

impl RequestContext {
    pub fn new(body: serde_json::Map<String, JsonValue>, user: Option<UserIdentity>) -> Self {
        Self { body, user }
    }

    /// Context for mutations with no originating request.
    pub fn background() -> Self {
        Self::default()
    }

    /// The request's variables map, when the body carries one.
    pub fn variables(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.body.get(VARIABLES_KEY).and_then(JsonValue::as_object)
    }
}
