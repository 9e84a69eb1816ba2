use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::error::AuthError;

#[derive(Debug, Error)]
#[error("email delivery failed: {0}")]
pub struct MailError(pub String);

impl From<MailError> for AuthError {
    fn from(err: MailError) -> Self {
        AuthError::EmailDelivery(err.0)
    }
}

/// Outbound email channel used for welcome notices and reset links.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Writes messages to the log instead of a real transport.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(from = %self.from, %to, %subject, body_len = body.len(), "email queued");
        Ok(())
    }
}
