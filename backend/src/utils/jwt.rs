//! JWT token utilities for authentication and session revocation.
//!
//! Tokens are signed with the subject's own secret rather than a global key.
//! Trust is re-derived from the store on every validation: the token's `jti`
//! must match the session identifier currently stored for its kind, so
//! overwriting or clearing that identifier revokes every older token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::errors::{StoreError, StoreResult};
use crate::utils::context::RequestContext;

/// The only accepted signing algorithm.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Which of the two per-user credentials a token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(TokenError::UnknownKind(other.to_string())),
        }
    }
}

/// Claims carried by every issued token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub sub: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Role name, informational only.
    #[serde(default)]
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    /// Session identifier this token belongs to.
    pub jti: String,
}

impl Claims {
    pub fn new(
        user_id: i64,
        kind: TokenKind,
        role: &str,
        jti: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: user_id,
            kind,
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: jti.to_string(),
        }
    }
}

/// Stored session material for one token kind of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// `None` once the session has been logged out.
    pub jti: Option<String>,
    pub secret: String,
}

/// Looks up the signing secret and current session identifier at verify time.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Returns `None` when the subject does not exist.
    async fn resolve(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        kind: TokenKind,
    ) -> StoreResult<Option<SessionKey>>;
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("unknown token type: {0}")]
    UnknownKind(String),
}

/// Why a presented token was refused.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("expected {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("unknown subject {0}")]
    UnknownSubject(i64),

    #[error("session revoked for user {0}")]
    Revoked(i64),

    #[error("token does not belong to the current session of user {0}")]
    JtiMismatch(i64),

    #[error("token expired")]
    Expired,

    #[error("bad signature")]
    BadSignature,

    #[error("failed to resolve signing secret: {0}")]
    Resolver(#[from] StoreError),
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: i64,
    pub role: String,
    pub kind: TokenKind,
}

/// Mints a token for `user_id` signed with that user's `secret`.
pub fn issue(
    user_id: i64,
    kind: TokenKind,
    role: &str,
    ttl: Duration,
    secret: &str,
    jti: &str,
) -> Result<String, TokenError> {
    let claims = Claims::new(user_id, kind, role, jti, Utc::now(), ttl);
    sign_claims(&claims, secret)
}

pub(crate) fn sign_claims(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(encode(&Header::new(ALGORITHM), claims, &key)?)
}

/// Reads the claims without checking the signature or expiry.
fn peek_claims(token: &str) -> Result<Claims, ValidationError> {
    let header =
        decode_header(token).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    if header.alg != ALGORITHM {
        return Err(ValidationError::UnsupportedAlgorithm(header.alg));
    }

    let mut validation = Validation::new(ALGORITHM);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| ValidationError::Malformed(e.to_string()))
}

fn verify_claims(token: &str, secret: &str) -> Result<Claims, ValidationError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ValidationError::Expired,
            ErrorKind::InvalidSignature => ValidationError::BadSignature,
            _ => ValidationError::Malformed(e.to_string()),
        })
}

/// Validates tokens against the session state held by a [`SecretResolver`].
pub struct TokenValidator<R> {
    resolver: R,
}

impl<R: SecretResolver> TokenValidator<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub async fn validate(
        &self,
        ctx: &RequestContext,
        token: &str,
        expected: TokenKind,
    ) -> Result<VerifiedToken, ValidationError> {
        let claims = peek_claims(token)?;
        if claims.kind != expected {
            return Err(ValidationError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }

        let user_id = claims.sub;
        let key = self
            .resolver
            .resolve(ctx, user_id, expected)
            .await?
            .ok_or(ValidationError::UnknownSubject(user_id))?;

        match key.jti.as_deref() {
            None => return Err(ValidationError::Revoked(user_id)),
            Some(stored) if stored != claims.jti => {
                return Err(ValidationError::JtiMismatch(user_id));
            }
            Some(_) => {}
        }

        let verified = verify_claims(token, &key.secret)?;
        debug!(user_id, kind = %expected, "Token verified");

        Ok(VerifiedToken {
            user_id: verified.sub,
            role: verified.role,
            kind: verified.kind,
        })
    }
}
