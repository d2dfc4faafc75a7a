//! Replaces the context with the contents of a JSON file.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::Context;
use crate::errors::UnitError;
use crate::template::expand_placeholders;

/// Reads the JSON object in `infile` and emits it.
#[derive(Debug)]
pub struct ReadJson {
    config: UnitConfig,
}

impl ReadJson {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Unit for ReadJson {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let infile = expand_placeholders(self.config.require("infile")?, &input);
        let text = tokio::fs::read_to_string(infile.trim()).await?;
        tracing::debug!(unit = self.config.label(), infile = %infile, bytes = text.len(), "Read JSON file");
        Ok(UnitOutcome::emit(Context::from_json_str(&text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Value;
    use crate::testing::TestEnv;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_reads_file_named_by_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("feed-7.json"),
            r#"{"items": [{"sku": "A"}], "_dtCreated": 0}"#,
        )
        .unwrap();

        let infile = format!("{}/feed-@batch.json", dir.path().display());
        let mut unit = ReadJson::new(UnitConfig::new("ReadJSON", [("infile", infile)], ""));
        let mut test_env = TestEnv::new();

        let outcome = unit
            .execute(Context::new().with("batch", 7), &mut test_env.env())
            .await
            .unwrap();
        let UnitOutcome::Emit { context, has_more } = outcome else {
            panic!("expected an emission");
        };
        assert!(!has_more);
        assert_eq!(context.get_string("items.0.sku"), "A");
        assert!(matches!(context.get("created"), Some(Value::DateTime(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let mut unit = ReadJson::new(UnitConfig::new("ReadJSON", [("infile", "/nonexistent/x.json")], ""));
        let mut test_env = TestEnv::new();
        let err = unit.execute(Context::new(), &mut test_env.env()).await.unwrap_err();
        assert!(matches!(err, UnitError::Io(_)));
    }
}
