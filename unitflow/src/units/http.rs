//! HTTP GET returning JSON.

use async_trait::async_trait;
use reqwest::header::ACCEPT;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::Context;
use crate::errors::UnitError;
use crate::template::expand_placeholders;

/// Fetches the URL in its body (after `@name` expansion) and emits the
/// JSON object it returns. An empty response body emits an empty context.
#[derive(Debug)]
pub struct Http {
    config: UnitConfig,
}

impl Http {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self { config }
    }

    fn url(&self, input: &Context) -> Result<String, UnitError> {
        let url = expand_placeholders(self.config.content(), input);
        let url = url.trim();
        if url.is_empty() {
            return Err(UnitError::invalid_config("empty URL"));
        }
        if url.contains("://") {
            Ok(url.to_string())
        } else {
            Ok(format!("http://{url}"))
        }
    }
}

#[async_trait]
impl Unit for Http {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let url = self.url(&input)?;
        tracing::info!(unit = self.config.label(), %url, "HTTP GET");

        let body = env
            .services
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(UnitOutcome::emit(Context::from_json_str(&body)?))
    }
}
