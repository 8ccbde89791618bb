//! JWT authentication for `connection_init`
//!
//! Clients send their token in the init payload:
//!
//! ```json
//! { "type": "connection_init", "payload": { "authToken": "eyJhbGciOiJIUzI1NiIs..." } }
//! ```
//!
//! When the payload carries no token, the `Authorization` header or `token`
//! query parameter of the upgrade request is used instead.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::connection::{ConnectionContext, RequestContext};
use crate::error::ConnectError;
use crate::server::ConnectionHooks;

/// Init payload keys checked for a token, in order
const TOKEN_KEYS: [&str; 3] = ["authToken", "token", "Authorization"];

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(subject: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: subject.into(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

/// Authentication errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),
    #[error("Token error: {0}")]
    TokenError(String),
    #[error("Token has expired")]
    TokenExpired,
    #[error("Missing authentication token")]
    MissingToken,
}

impl From<AuthError> for ConnectError {
    fn from(err: AuthError) -> Self {
        ConnectError::new(err.to_string())
    }
}

/// Connect hook validating HS256 tokens
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Lifetime of issued tokens in seconds (default: 1 hour)
    pub token_ttl: i64,
}

impl JwtAuth {
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(AuthError::InvalidSecret(format!(
                "secret must be at least {} characters",
                Self::MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: 3600,
        })
    }

    /// Issue a token for `subject`
    pub fn generate_token(&self, subject: &str) -> Result<String, AuthError> {
        let claims = Claims::new(subject, self.token_ttl);
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenError(e.to_string()))
    }

    /// Validate a token and return claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        // Expiry is exact; no clock-skew allowance
        let mut validation = Validation::default();
        validation.leeway = 0;

        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenError(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    fn find_token<'a>(payload: Option<&'a Value>, request: &'a RequestContext) -> Option<&'a str> {
        payload
            .and_then(|p| TOKEN_KEYS.iter().find_map(|key| p.get(*key)?.as_str()))
            .or_else(|| request.bearer_token())
    }
}

#[async_trait]
impl ConnectionHooks for JwtAuth {
    async fn on_connect(
        &self,
        ctx: &ConnectionContext,
        payload: Option<&Value>,
    ) -> Result<(), ConnectError> {
        let token =
            Self::find_token(payload, ctx.request_context()).ok_or(AuthError::MissingToken)?;
        let claims = self.validate_token(token)?;
        debug!(conn_id = ctx.id(), user = %claims.sub, "connection authenticated");
        Ok(())
    }
}
