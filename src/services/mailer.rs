use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::errors::ServiceError;

/// One outbound message. Dispatch is fire-and-forget: a failure is reported
/// to the caller but nothing is rolled back or retried.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail delivery is not configured")]
    Disabled,
    #[error("mail endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("mail endpoint rejected the message: {0}")]
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutboundEmail) -> Result<(), MailerError>;
}

/// Client for a transactional-mail HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, from: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build mail client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            from,
        })
    }
}

#[derive(Serialize)]
struct MailBody<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &OutboundEmail) -> Result<(), MailerError> {
        let body = MailBody {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            info!(to = %message.to, "mail dispatched");
            Ok(())
        } else {
            Err(MailerError::Rejected(format!(
                "mail endpoint returned {}",
                response.status()
            )))
        }
    }
}

/// Stand-in when no mail endpoint is configured; every send reports failure
/// without side effects.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _message: &OutboundEmail) -> Result<(), MailerError> {
        Err(MailerError::Disabled)
    }
}
