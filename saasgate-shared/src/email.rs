/// Outbound email delivery
///
/// The auth flow only sees the [`EmailSender`] port. Production uses
/// [`HttpEmailSender`] (Resend-style JSON API); without an API key the
/// [`LogEmailSender`] writes messages to the log instead.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    Transport(String),

    #[error("Email API rejected the message: {0}")]
    Rejected(String),
}

/// A plain-text message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl EmailMessage {
    pub fn verification(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verify your email".to_string(),
            text: format!(
                "Welcome!\n\nConfirm your email address by opening the link below:\n\n{link}\n\n\
                 If you did not create an account, you can ignore this message."
            ),
        }
    }

    pub fn password_reset(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            text: format!(
                "A password reset was requested for your account.\n\n\
                 Choose a new password here:\n\n{link}\n\n\
                 If you did not request this, you can ignore this message."
            ),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Sends through an HTTP email API with a bearer key
#[derive(Clone)]
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: RESEND_ENDPOINT.to_string(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

impl std::fmt::Debug for HttpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmailSender")
            .field("endpoint", &self.endpoint)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    #[tracing::instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let body = ResendRequest {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };

        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmailError::Rejected(e.to_string()))?;

        tracing::debug!("Email delivered to provider");
        Ok(())
    }
}

/// Logs messages instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "Email delivery disabled, logging message"
        );
        Ok(())
    }
}
