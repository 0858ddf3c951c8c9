/// Outbound notification collaborator and its SMTP implementation
use crate::config::EmailSettings;
use crate::error::{CredentialError, Result};
use crate::models::Account;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, account: &Account, subject: &str, body: &str) -> Result<()>;
}

/// Async email transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct EmailNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Build the notifier from configuration
    ///
    /// If SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config.smtp_from.parse::<Mailbox>().map_err(|e| {
            CredentialError::Internal(format!("Invalid SMTP_FROM address: {}", e))
        })?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; email notifier will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| {
                CredentialError::Internal(format!("Failed to configure SMTP transport: {}", e))
            })?
            .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, account: &Account, subject: &str, body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                subject,
                user_id = %account.id,
                "Email notifier running in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        let to = account.email.parse::<Mailbox>().map_err(|e| {
            CredentialError::Notifier(format!("Invalid recipient email address: {}", e))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| CredentialError::Notifier(format!("Failed to build email message: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| CredentialError::Notifier(format!("Failed to send email: {}", e)))?;
        info!(subject, user_id = %account.id, "email sent successfully");
        Ok(())
    }
}
