//! JWT issuance and verification
//!
//! HS256 tokens with separate access and refresh secrets. Claims carry the
//! user id and email; expiry is validated on decode.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access token lifetime.
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

/// Refresh token lifetime.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token signing failed")]
    Signing,
    #[error("Invalid token")]
    Invalid,
}

/// Signs and verifies the service's JWTs.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
        }
    }

    /// Issue a fresh access/refresh pair for a user.
    pub fn issue_pair(&self, user_id: &str, email: &str) -> Result<TokenPair, TokenError> {
        let access_token = sign(
            &self.access_secret,
            user_id,
            email,
            Duration::hours(ACCESS_TOKEN_TTL_HOURS),
        )?;
        let refresh_token = sign(
            &self.refresh_secret,
            user_id,
            email,
            Duration::days(REFRESH_TOKEN_TTL_DAYS),
        )?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        verify(&self.access_secret, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        verify(&self.refresh_secret, token)
    }
}

fn sign(secret: &str, user_id: &str, email: &str, ttl: Duration) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Signing)
}

fn verify(secret: &str, token: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| TokenError::Invalid)
}
