//! Outgoing email.
//!
//! The Mail unit builds an [`OutgoingMail`] and hands it to a [`Mailer`].
//! The bundled [`SmtpMailer`] sends through `lettre`'s tokio transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Debug;

use crate::config::SmtpConfig;
use crate::errors::{ConfigurationError, MailError};

/// A composed email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Send the body as `text/html` rather than `text/plain`.
    pub html: bool,
}

impl OutgoingMail {
    /// Splits a recipient list separated by commas or semicolons.
    #[must_use]
    pub fn parse_recipients(list: &str) -> Vec<String> {
        list.split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync + Debug {
    /// Sends one message.
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Mailer used when no SMTP server is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

/// SMTP mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Builds a mailer from the `[smtp]` settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the STARTTLS relay cannot be set
    /// up for the host.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, ConfigurationError> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ConfigurationError::invalid_setting("smtp.host", e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if let Some(user) = &config.user {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.clone(), password));
        }

        Ok(Self {
            transport: builder.build(),
            host: config.host.clone(),
        })
    }

    fn compose(mail: &OutgoingMail) -> Result<Message, MailError> {
        let mailbox = |address: &str| {
            address
                .parse::<Mailbox>()
                .map_err(|e| MailError::Compose(format!("invalid address '{address}': {e}")))
        };

        let mut builder = Message::builder()
            .from(mailbox(&mail.from)?)
            .subject(mail.subject.clone())
            .header(if mail.html {
                ContentType::TEXT_HTML
            } else {
                ContentType::TEXT_PLAIN
            });
        for recipient in &mail.to {
            builder = builder.to(mailbox(recipient)?);
        }

        builder
            .body(mail.body.clone())
            .map_err(|e| MailError::Compose(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if mail.to.is_empty() {
            return Err(MailError::Compose("no recipients".into()));
        }
        let message = Self::compose(&mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::info!(host = %self.host, recipients = mail.to.len(), "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            from: "robot@example.com".into(),
            to: vec!["ops@example.com".into()],
            subject: "Nightly".into(),
            body: "<b>done</b>".into(),
            html: true,
        }
    }

    #[test]
    fn test_parse_recipients() {
        assert_eq!(
            OutgoingMail::parse_recipients("a@x.com; b@x.com, ,c@x.com"),
            vec!["a@x.com", "b@x.com", "c@x.com"]
        );
    }

    #[test]
    fn test_compose_valid_message() {
        let message = SmtpMailer::compose(&mail()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Nightly"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_compose_rejects_bad_address() {
        let mut bad = mail();
        bad.to = vec!["not an address".into()];
        assert!(matches!(
            SmtpMailer::compose(&bad),
            Err(MailError::Compose(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_mailer() {
        assert!(matches!(
            DisabledMailer.send(mail()).await,
            Err(MailError::NotConfigured)
        ));
    }
}
