//! API response types
//!
//! The service speaks a GraphQL-style envelope: successes are
//! `{"data": {...}}`, failures are `{"errors": [{"message", "extensions"}]}`
//! with an HTTP status matching the error class.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};

/// Application error type that renders as a GraphQL-style error envelope.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            },
        };

        let body = Json(json!({
            "errors": [{
                "message": message,
                "extensions": { "code": code }
            }]
        }));

        (status, body).into_response()
    }
}

/// Wrap an operation's result under `data.<operation>`.
pub fn data_response(operation: &str, result: JsonValue) -> Json<JsonValue> {
    let mut field = serde_json::Map::new();
    field.insert(operation.to_string(), result);
    let mut envelope = serde_json::Map::new();
    envelope.insert("data".to_string(), JsonValue::Object(field));
    Json(JsonValue::Object(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_response_nests_under_operation_name() {
        let Json(value) = data_response("getUser", json!({"_id": "U1"}));
        assert_eq!(value["data"]["getUser"]["_id"], "U1");
    }
}
