//! Outgoing mail
//!
//! Password reset links are delivered through a [`Mailer`]. The SMTP backend
//! sends real mail; the log backend writes the message to the log, which is
//! enough for development.

use crate::config::{MailBackend, MailConfig};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// A plain-text mail message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// Delivers mail through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("mail.smtp_host must be set for the smtp backend"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("Failed to create SMTP transport for {}", host))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from, e))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| anyhow!("Invalid to address '{}': {}", mail.to, e))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .context("Failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Writes mail to the log instead of sending it
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
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        tracing::info!(
            from = %self.from,
            to = %mail.to,
            subject = %mail.subject,
            "Outgoing mail:\n{}",
            mail.body
        );
        Ok(())
    }
}

/// Build the mailer selected by the configuration
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.backend {
        MailBackend::Log => Ok(Arc::new(LogMailer::new(config.from.clone()))),
        MailBackend::Smtp => Ok(Arc::new(SmtpMailer::new(config)?)),
    }
}

/// Keeps sent mail in memory for inspection
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(mail);
        Ok(())
    }
}
