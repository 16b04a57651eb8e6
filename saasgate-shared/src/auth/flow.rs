/// Account lifecycle: register, verify, login, refresh, logout, password reset
///
/// ```text
/// unregistered ──register──▶ pending_verification ──verify──▶ active ⇄ disabled_by_admin
/// ```
///
/// Failures are reported through [`AuthFlowError`], whose `Display` text is the
/// user-facing message. Login never says whether the account exists, and
/// forgot-password answers the same way whether or not it sent an email.

use super::action_token::{ActionPurpose, ActionTokenSigner};
use super::password::{self, PasswordError};
use super::session::{TokenError, TokenPair, TokenService};
use crate::email::{EmailMessage, EmailSender};
use crate::models::user::{CreateUser, User};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Constraint backing case-insensitive email uniqueness
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_lower_key";

#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    #[error("A user with that email already exists.")]
    EmailTaken,

    /// `field` names the request field holding the rejected password
    #[error("{message}")]
    WeakPassword { field: &'static str, message: String },

    #[error("Invalid user.")]
    InvalidUser,

    #[error("User is disabled by admin.")]
    UserDisabled,

    #[error("Invalid or expired token.")]
    InvalidOrExpiredToken,

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("Please verify your email before logging in.")]
    NotVerified,

    #[error("Refresh token not provided.")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Registration input, already shape-validated by the caller
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Outcome of a verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Activated,
    AlreadyActive,
}

/// Checks account state after the password matched
///
/// Inactive is reported before disabled.
pub fn check_login_allowed(user: &User) -> Result<(), AuthFlowError> {
    if !user.is_active {
        return Err(AuthFlowError::NotVerified);
    }
    if user.is_disabled_by_admin {
        return Err(AuthFlowError::UserDisabled);
    }
    Ok(())
}

/// Builds `{frontend}{path}?uid={id}&token={token}`
pub fn action_link(frontend_url: &str, path: &str, user_id: Uuid, token: &str) -> String {
    format!(
        "{}{}?uid={}&token={}",
        frontend_url.trim_end_matches('/'),
        path,
        user_id,
        token
    )
}

pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";

#[derive(Clone)]
pub struct AuthFlow {
    db: PgPool,
    tokens: TokenService,
    signer: ActionTokenSigner,
    mailer: Arc<dyn EmailSender>,
    frontend_url: String,
    default_tier: String,
}

impl AuthFlow {
    pub fn new(
        db: PgPool,
        tokens: TokenService,
        signer: ActionTokenSigner,
        mailer: Arc<dyn EmailSender>,
        frontend_url: impl Into<String>,
        default_tier: impl Into<String>,
    ) -> Self {
        Self {
            db,
            tokens,
            signer,
            mailer,
            frontend_url: frontend_url.into(),
            default_tier: default_tier.into(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Creates an inactive user on the default tier and mails a verification link
    ///
    /// A delivery failure is logged, not returned: the account exists either way.
    pub async fn register(&self, input: Registration) -> Result<User, AuthFlowError> {
        password::validate_password(&input.password).map_err(|message| {
            AuthFlowError::WeakPassword {
                field: "password",
                message,
            }
        })?;

        let email = input.email.trim().to_string();
        if User::find_by_email(&self.db, &email).await?.is_some() {
            return Err(AuthFlowError::EmailTaken);
        }

        let password_hash = password::hash_password(&input.password)?;

        let user = User::create(
            &self.db,
            CreateUser {
                email,
                password_hash,
                first_name: input.first_name,
                last_name: input.last_name,
                user_type: self.default_tier.clone(),
            },
        )
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) => {
                AuthFlowError::EmailTaken
            }
            _ => AuthFlowError::Database(e),
        })?;

        tracing::info!(user_id = %user.id, "User registered");

        let token = self.signer.make_token(&user, ActionPurpose::VerifyEmail);
        let link = action_link(&self.frontend_url, VERIFY_EMAIL_PATH, user.id, &token);
        if let Err(e) = self
            .mailer
            .send(&EmailMessage::verification(&user.email, &link))
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send verification email");
        }

        Ok(user)
    }

    /// Activates the user if the token matches; repeat calls succeed without writing
    pub async fn verify_email(&self, uid: &str, token: &str) -> Result<Verification, AuthFlowError> {
        let user = self.load_for_action(uid).await?;

        if !self.signer.check_token(&user, ActionPurpose::VerifyEmail, token) {
            return Err(AuthFlowError::InvalidOrExpiredToken);
        }

        if User::activate(&self.db, user.id).await? {
            tracing::info!(user_id = %user.id, "Email verified");
            Ok(Verification::Activated)
        } else {
            Ok(Verification::AlreadyActive)
        }
    }

    /// Authenticates by email and password and issues a token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthFlowError> {
        let Some(user) = User::find_by_email(&self.db, email.trim()).await? else {
            password::verify_against_dummy(password);
            return Err(AuthFlowError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthFlowError::InvalidCredentials);
        }

        check_login_allowed(&user)?;

        User::update_last_login(&self.db, user.id).await?;
        let pair = self.tokens.issue_pair(user.id)?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Exchanges a refresh token for new tokens
    ///
    /// The owner must still exist, be active and not be disabled.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenPair, AuthFlowError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthFlowError::MissingToken)?;

        let pair = self
            .tokens
            .verify_and_consume_refresh_token(&self.db, token)
            .await?;

        match User::find_by_id(&self.db, pair.user_id).await? {
            Some(user) if user.is_active && !user.is_disabled_by_admin => Ok(pair),
            _ => Err(AuthFlowError::Token(TokenError::Invalid)),
        }
    }

    /// Revokes the refresh token if one is given; never fails
    pub async fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            return;
        };

        match self.tokens.blacklist_refresh_token(&self.db, token).await {
            Ok(()) => tracing::debug!("Refresh token revoked on logout"),
            Err(e) => tracing::debug!(error = %e, "Logout revocation skipped"),
        }
    }

    /// Mails a reset link to an enabled account; silent otherwise
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthFlowError> {
        let user = match User::find_by_email(&self.db, email.trim()).await? {
            Some(user) if !user.is_disabled_by_admin => user,
            _ => return Ok(()),
        };

        let token = self.signer.make_token(&user, ActionPurpose::PasswordReset);
        let link = action_link(&self.frontend_url, RESET_PASSWORD_PATH, user.id, &token);

        if let Err(e) = self
            .mailer
            .send(&EmailMessage::password_reset(&user.email, &link))
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
        }

        Ok(())
    }

    /// Sets a new password if the reset token matches the current state
    pub async fn reset_password(
        &self,
        uid: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthFlowError> {
        let user = self.load_for_action(uid).await?;

        if !self.signer.check_token(&user, ActionPurpose::PasswordReset, token) {
            return Err(AuthFlowError::InvalidOrExpiredToken);
        }

        password::validate_password(new_password).map_err(|message| {
            AuthFlowError::WeakPassword {
                field: "new_password",
                message,
            }
        })?;
        let password_hash = password::hash_password(new_password)?;
        User::set_password_hash(&self.db, user.id, &password_hash).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    async fn load_for_action(&self, uid: &str) -> Result<User, AuthFlowError> {
        let id = Uuid::parse_str(uid.trim()).map_err(|_| AuthFlowError::InvalidUser)?;
        let user = User::find_by_id(&self.db, id)
            .await?
            .ok_or(AuthFlowError::InvalidUser)?;

        if user.is_disabled_by_admin {
            return Err(AuthFlowError::UserDisabled);
        }
        Ok(user)
    }
}
