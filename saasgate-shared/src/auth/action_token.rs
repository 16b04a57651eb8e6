/// Purpose-tagged action tokens for email verification and password reset
///
/// An action token is `"{expires_at}.{signature}"` where the signature is
/// HMAC-SHA256 over `(purpose, user id, fingerprint, expires_at)`. Nothing is
/// stored: a token is checked by recomputing the signature from the user's
/// current state.
///
/// # Fingerprints
///
/// The fingerprint is the part of the user's state the token is bound to. Once
/// the action changes that state, every token issued before it stops verifying.
///
/// | Purpose          | Fingerprint fields                          |
/// |------------------|---------------------------------------------|
/// | `verify_email`   | email (lowercased)                          |
/// | `password_reset` | password hash, `last_login_at`, email       |
///
/// Resetting a password replaces the hash, so a reset token works once.
/// A verification token stays checkable after activation, but activation is
/// idempotent, so replaying it can never change anything; changing the
/// address does invalidate it.
///
/// # Example
///
/// ```
/// use saasgate_shared::auth::action_token::{ActionPurpose, ActionTokenSigner};
/// use chrono::{Duration, Utc};
/// use uuid::Uuid;
///
/// let signer = ActionTokenSigner::new("signing-secret", Duration::hours(24));
/// let user_id = Uuid::new_v4();
/// let now = Utc::now();
///
/// let token = signer.make_token_at(user_id, ActionPurpose::PasswordReset, "hash-1", now);
/// assert!(signer.check_token_at(user_id, ActionPurpose::PasswordReset, "hash-1", &token, now));
/// assert!(!signer.check_token_at(user_id, ActionPurpose::PasswordReset, "hash-2", &token, now));
/// ```

use crate::models::user::User;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// What an action token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPurpose {
    VerifyEmail,
    PasswordReset,
}

impl ActionPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPurpose::VerifyEmail => "verify_email",
            ActionPurpose::PasswordReset => "password_reset",
        }
    }

    /// Extracts the state this purpose's tokens are bound to
    pub fn fingerprint(&self, user: &User) -> String {
        let email = user.email.to_lowercase();
        match self {
            ActionPurpose::VerifyEmail => email,
            ActionPurpose::PasswordReset => {
                let last_login = user
                    .last_login_at
                    .map(|t| t.timestamp().to_string())
                    .unwrap_or_default();
                format!("{}:{}:{}", user.password_hash, last_login, email)
            }
        }
    }
}

/// Issues and checks action tokens with one secret and validity window
#[derive(Clone)]
pub struct ActionTokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for ActionTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ActionTokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user` bound to its current state
    pub fn make_token(&self, user: &User, purpose: ActionPurpose) -> String {
        self.make_token_at(user.id, purpose, &purpose.fingerprint(user), Utc::now())
    }

    /// Checks a token against `user`'s current state
    ///
    /// Never errors: malformed, expired, foreign or stale tokens all yield `false`.
    pub fn check_token(&self, user: &User, purpose: ActionPurpose, token: &str) -> bool {
        self.check_token_at(user.id, purpose, &purpose.fingerprint(user), token, Utc::now())
    }

    pub fn make_token_at(
        &self,
        user_id: Uuid,
        purpose: ActionPurpose,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> String {
        let expires_at = (now + self.ttl).timestamp();
        let signature = self.mac(user_id, purpose, fingerprint, expires_at).finalize();
        format!("{}.{}", expires_at, hex::encode(signature.into_bytes()))
    }

    pub fn check_token_at(
        &self,
        user_id: Uuid,
        purpose: ActionPurpose,
        fingerprint: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some((expires_part, signature_part)) = token.split_once('.') else {
            return false;
        };
        let Ok(expires_at) = expires_part.parse::<i64>() else {
            return false;
        };
        let Ok(signature) = hex::decode(signature_part) else {
            return false;
        };

        if now.timestamp() > expires_at {
            return false;
        }

        // Constant-time comparison
        self.mac(user_id, purpose, fingerprint, expires_at)
            .verify_slice(&signature)
            .is_ok()
    }

    fn mac(
        &self,
        user_id: Uuid,
        purpose: ActionPurpose,
        fingerprint: &str,
        expires_at: i64,
    ) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        for part in [
            purpose.as_str().as_bytes(),
            user_id.as_bytes().as_slice(),
            fingerprint.as_bytes(),
            expires_at.to_string().as_bytes(),
        ] {
            mac.update(&(part.len() as u64).to_be_bytes());
            mac.update(part);
        }
        mac
    }
}
