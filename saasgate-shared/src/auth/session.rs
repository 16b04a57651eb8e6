/// Token service: access/refresh issuance and refresh-token rotation
///
/// Access tokens are stateless. Refresh tokens are stateless too, except for
/// the blacklist: consuming a refresh token means inserting its `jti` into
/// `blacklisted_tokens`, and that insert is the only step that can fail under
/// a race. Two concurrent refreshes with the same token therefore produce one
/// success and one `Blacklisted`.
///
/// # Rotation policy
///
/// With rotation on (the default) every successful refresh blacklists the
/// presented token and issues a new one. With rotation off the presented
/// token is returned unchanged and stays usable until it expires or is
/// revoked by logout; replay protection is then absent.

use super::jwt::{self, Claims, JwtError, TokenType};
use crate::models::blacklisted_token::BlacklistedToken;
use chrono::Duration;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Token failure as seen by callers
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is invalid")]
    Invalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token is blacklisted")]
    Blacklisted,

    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => TokenError::Expired,
            JwtError::CreateError(msg) => TokenError::Signing(msg),
            _ => TokenError::Invalid,
        }
    }
}

/// Lifetimes, secret and rotation switch
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub rotate_refresh_tokens: bool,
}

/// A signed token and its remaining lifetime in seconds
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: Uuid,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Debug, Clone)]
pub struct TokenService {
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue(user_id, TokenType::Access, self.settings.access_lifetime)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue(user_id, TokenType::Refresh, self.settings.refresh_lifetime)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            user_id,
            access: self.issue_access_token(user_id)?,
            refresh: self.issue_refresh_token(user_id)?,
        })
    }

    /// Verifies a bearer token without touching the database
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(jwt::validate_access_token(token, &self.settings.secret)?)
    }

    /// Exchanges a refresh token for a new access token (and, with rotation, a new refresh token)
    ///
    /// # Errors
    ///
    /// - `Invalid` / `Expired` when the JWT does not verify
    /// - `Blacklisted` when the token was already consumed or revoked
    pub async fn verify_and_consume_refresh_token(
        &self,
        pool: &PgPool,
        token: &str,
    ) -> Result<TokenPair, TokenError> {
        let claims = jwt::validate_refresh_token(token, &self.settings.secret)?;

        let refresh = if self.settings.rotate_refresh_tokens {
            let consumed =
                BlacklistedToken::insert(pool, claims.jti, claims.sub, claims.expires_at()).await?;
            if !consumed {
                tracing::warn!(user_id = %claims.sub, jti = %claims.jti, "Refresh token replayed");
                return Err(TokenError::Blacklisted);
            }
            self.issue_refresh_token(claims.sub)?
        } else {
            if BlacklistedToken::exists(pool, claims.jti).await? {
                return Err(TokenError::Blacklisted);
            }
            IssuedToken {
                token: token.to_string(),
                expires_in: remaining_seconds(&claims),
            }
        };

        tracing::debug!(user_id = %claims.sub, rotated = self.settings.rotate_refresh_tokens, "Refresh token exchanged");

        Ok(TokenPair {
            user_id: claims.sub,
            access: self.issue_access_token(claims.sub)?,
            refresh,
        })
    }

    /// Revokes a refresh token
    ///
    /// Fails with `Blacklisted` if it was already revoked, or with
    /// `Invalid`/`Expired` if it does not verify.
    pub async fn blacklist_refresh_token(
        &self,
        pool: &PgPool,
        token: &str,
    ) -> Result<(), TokenError> {
        let claims = jwt::validate_refresh_token(token, &self.settings.secret)?;

        if BlacklistedToken::insert(pool, claims.jti, claims.sub, claims.expires_at()).await? {
            Ok(())
        } else {
            Err(TokenError::Blacklisted)
        }
    }

    fn issue(
        &self,
        user_id: Uuid,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let claims = Claims::with_expiration(user_id, token_type, lifetime);
        let token = jwt::create_token(&claims, &self.settings.secret)?;

        Ok(IssuedToken {
            token,
            expires_in: lifetime.num_seconds(),
        })
    }
}

fn remaining_seconds(claims: &Claims) -> i64 {
    claims
        .time_until_expiration()
        .map(|d| d.num_seconds())
        .unwrap_or(0)
}
