//! Replaces the context with a sub-tree of an XML file.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::{Context, Value};
use crate::errors::UnitError;
use crate::template::expand_placeholders;

/// Reads `infile` as an XML tree and emits the element at `path`.
///
/// The root element is the first path segment, e.g. `feed.header`. A blank
/// `path` emits the whole document.
#[derive(Debug)]
pub struct ReadXml {
    config: UnitConfig,
}

impl ReadXml {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Unit for ReadXml {
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
        let document = Context::from_xml_str(&text)?;

        let path = self.config.attr("path").unwrap_or_default().trim();
        if path.is_empty() {
            return Ok(UnitOutcome::emit(document));
        }
        match document.get_path(path) {
            Some(Value::Map(subtree)) => Ok(UnitOutcome::emit(subtree.clone())),
            Some(other) => Err(UnitError::shape(format!(
                "element at '{path}' is a {}, not a map",
                other.type_name()
            ))),
            None => Err(UnitError::shape(format!("no element at '{path}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"<?xml version="1.0"?>
<feed>
  <header source="erp"><created>2024-03-01</created></header>
  <item sku="A"/>
  <item sku="B"/>
</feed>"#;

    fn unit(dir: &std::path::Path, path: &str) -> ReadXml {
        let infile = dir.join("feed.xml").display().to_string();
        ReadXml::new(UnitConfig::new("ReadXML", [("infile", infile.as_str()), ("path", path)], ""))
    }

    #[tokio::test]
    async fn test_emits_subtree_at_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed.xml"), FEED).unwrap();
        let mut test_env = TestEnv::new();

        let outcome = unit(dir.path(), "feed.header")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap();

        let expected = Context::new().with("source", "erp").with("created", "2024-03-01");
        assert_eq!(outcome, UnitOutcome::emit(expected));
    }

    #[tokio::test]
    async fn test_repeated_elements_become_a_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed.xml"), FEED).unwrap();
        let mut test_env = TestEnv::new();

        let outcome = unit(dir.path(), "feed")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap();
        let UnitOutcome::Emit { context, .. } = outcome else {
            panic!("expected an emission");
        };
        assert_eq!(context.get_string("item.1.sku"), "B");
    }

    #[tokio::test]
    async fn test_path_to_text_is_a_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed.xml"), FEED).unwrap();
        let mut test_env = TestEnv::new();

        let err = unit(dir.path(), "feed.header.created")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::Shape(_)));
    }

    #[tokio::test]
    async fn test_missing_path_is_a_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed.xml"), FEED).unwrap();
        let mut test_env = TestEnv::new();

        let err = unit(dir.path(), "feed.footer")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::Shape(_)));
    }
}
