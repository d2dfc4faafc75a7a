//! Templated email notification.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::Context;
use crate::errors::UnitError;
use crate::mail::OutgoingMail;
use crate::template::expand_placeholders;

/// Renders its body (or the file named by `template`) against the input
/// and, when the result is non-empty, sends it to `to` with `subject`.
///
/// Mail problems are logged and never abort the pipeline; the input is
/// always passed through unchanged.
#[derive(Debug)]
pub struct Mail {
    config: UnitConfig,
}

impl Mail {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self { config }
    }

    async fn template(&self, input: &Context) -> Result<String, UnitError> {
        match self.config.attr("template").filter(|t| !t.trim().is_empty()) {
            Some(path) => {
                let path = expand_placeholders(path, input);
                Ok(tokio::fs::read_to_string(path.trim()).await?)
            }
            None => Ok(self.config.content().to_string()),
        }
    }

    fn header(&self, name: &str, input: &Context) -> String {
        self.config
            .attr(name)
            .map(|value| expand_placeholders(value, input).trim().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Unit for Mail {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let label = self.config.label();

        let template = match self.template(&input).await {
            Ok(template) => template,
            Err(e) => {
                tracing::warn!(unit = label, error = %e, "Cannot read mail template");
                return Ok(UnitOutcome::emit(input));
            }
        };
        let body = match env.services.templates.render(&template, &input) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(unit = label, error = %e, "Cannot render mail template");
                return Ok(UnitOutcome::emit(input));
            }
        };
        if body.trim().is_empty() {
            tracing::debug!(unit = label, "Rendered mail is empty, nothing to send");
            return Ok(UnitOutcome::emit(input));
        }

        let Some(smtp) = &env.config.smtp else {
            tracing::warn!(unit = label, "SMTP is not configured, mail not sent");
            return Ok(UnitOutcome::emit(input));
        };

        let from = Some(self.header("from", &input))
            .filter(|from| !from.is_empty())
            .or_else(|| smtp.from.clone())
            .unwrap_or_default();
        let mail = OutgoingMail {
            from,
            to: OutgoingMail::parse_recipients(&self.header("to", &input)),
            subject: self.header("subject", &input),
            body,
            html: self.config.flag("html", true),
        };

        if let Err(e) = env.services.mailer.send(mail).await {
            tracing::warn!(unit = label, job = env.job_id, error = %e, "Mail not sent");
        }
        Ok(UnitOutcome::emit(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;
    use crate::testing::{RecordingMailer, TestEnv};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn smtp() -> SmtpConfig {
        SmtpConfig {
            host: "mail.local".into(),
            port: 25,
            user: None,
            password: None,
            from: Some("robot@example.com".into()),
            starttls: false,
        }
    }

    fn unit(body: &str) -> Mail {
        Mail::new(UnitConfig::new(
            "Mail",
            [("to", "@owner; ops@example.com"), ("subject", "Order @id")],
            body,
        ))
    }

    fn env_with_mailer(mailer: &RecordingMailer) -> TestEnv {
        let mut test_env = TestEnv::new();
        test_env.config.smtp = Some(smtp());
        test_env.services = test_env.services.clone().with_mailer(Arc::new(mailer.clone()));
        test_env
    }

    #[tokio::test]
    async fn test_renders_and_sends() {
        let mailer = RecordingMailer::new();
        let mut test_env = env_with_mailer(&mailer);
        let input = Context::new().with("id", 7).with("owner", "ada@example.com");

        let outcome = unit("Order $id is ready")
            .execute(input.clone(), &mut test_env.env())
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::emit(input));
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "robot@example.com");
        assert_eq!(sent[0].to, vec!["ada@example.com", "ops@example.com"]);
        assert_eq!(sent[0].subject, "Order 7");
        assert_eq!(sent[0].body, "Order 7 is ready");
        assert!(sent[0].html);
    }

    #[tokio::test]
    async fn test_empty_render_sends_nothing() {
        let mailer = RecordingMailer::new();
        let mut test_env = env_with_mailer(&mailer);

        unit("$!missing  ")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap();
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_without_smtp_passes_through() {
        let mailer = RecordingMailer::new();
        let mut test_env = env_with_mailer(&mailer);
        test_env.config.smtp = None;

        let outcome = unit("hello")
            .execute(Context::new().with("a", 1), &mut test_env.env())
            .await
            .unwrap();
        assert_eq!(outcome, UnitOutcome::emit(Context::new().with("a", 1)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let mailer = RecordingMailer::failing();
        let mut test_env = env_with_mailer(&mailer);

        let outcome = unit("hello").execute(Context::new(), &mut test_env.env()).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_template_file_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.vm");
        std::fs::write(&path, "Dear $name").unwrap();

        let mailer = RecordingMailer::new();
        let mut test_env = env_with_mailer(&mailer);
        let path = path.display().to_string();
        let mut unit = Mail::new(UnitConfig::new(
            "Mail",
            [("to", "x@example.com"), ("template", path.as_str()), ("html", "false")],
            "ignored",
        ));

        unit.execute(Context::new().with("name", "Ada"), &mut test_env.env())
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent[0].body, "Dear Ada");
        assert!(!sent[0].html);
    }
}
