//! Shared collaborators handed to every unit.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::errors::ConfigurationError;
use crate::mail::{DisabledMailer, Mailer, SmtpMailer};
use crate::script::{BuiltinScriptEngine, ScriptEngine};
use crate::template::{TemplateRenderer, VelocityRenderer};

/// Long-lived collaborators built once at startup.
#[derive(Debug, Clone)]
pub struct Services {
    /// HTTP client used by the Http unit.
    pub http: reqwest::Client,
    /// Mailer used by the Mail unit.
    pub mailer: Arc<dyn Mailer>,
    /// Renderer used by the Mail unit.
    pub templates: Arc<dyn TemplateRenderer>,
    /// Compiler used by the Where and Script units.
    pub scripts: Arc<dyn ScriptEngine>,
}

impl Services {
    /// Bundled renderer and script engine, mail disabled.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            mailer: Arc::new(DisabledMailer),
            templates: Arc::new(VelocityRenderer::new()),
            scripts: Arc::new(BuiltinScriptEngine::new()),
        }
    }

    /// Builds the bundled collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the HTTP client or SMTP transport
    /// cannot be built.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .user_agent(config.http.user_agent.clone())
            .build()
            .map_err(|e| ConfigurationError::invalid_setting("http", e.to_string()))?;

        let services = Self::new(http);
        match &config.smtp {
            Some(smtp) => Ok(services.with_mailer(Arc::new(SmtpMailer::from_config(smtp)?))),
            None => Ok(services),
        }
    }

    /// Replaces the mailer.
    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_smtp() {
        let services = Services::from_config(&WorkerConfig::default()).unwrap();
        assert!(format!("{:?}", services.mailer).contains("DisabledMailer"));
    }
}
