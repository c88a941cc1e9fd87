//! Bearer-token identity extraction
//!
//! Verifies the `Authorization: Bearer <token>` header against the access
//! secret and attaches the caller's identity to the request. Requests without
//! the header proceed anonymously; whether an operation tolerates that is
//! decided at dispatch. A header that is present but invalid is rejected
//! outright.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::response::ApiError;
use crate::audit::UserIdentity;
use crate::features::auth::jwt::TokenService;

/// The request's verified caller, `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<UserIdentity>);

pub async fn attach_identity(
    State(tokens): State<TokenService>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let identity = match bearer {
        Some(token) => match tokens.verify_access(&token) {
            Ok(claims) => Some(UserIdentity { id: claims.sub }),
            Err(_) => {
                return ApiError::unauthorized("Invalid or expired access token").into_response();
            },
        },
        None => None,
    };

    request.extensions_mut().insert(CurrentUser(identity));
    next.run(request).await
}
