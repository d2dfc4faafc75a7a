//! Unit contract and the built-in unit catalogue.
//!
//! A unit is one pipeline stage. Each activation receives its own copy of
//! the upstream context and answers with a [`UnitOutcome`]: emit a context
//! downstream, filter this activation, or report that nothing is left.
//! Units that iterate keep their cursor on `&mut self`; the registry keeps
//! one instance per definition node, so that state survives across
//! activations.

mod filter;
mod foreach;
mod http;
mod if_change;
mod mail;
mod read_json;
mod read_xml;
mod script;
mod select;
mod write_csv;

pub use filter::Where;
pub use foreach::Foreach;
pub use http::Http;
pub use if_change::IfChange;
pub use mail::Mail;
pub use read_json::ReadJson;
pub use read_xml::ReadXml;
pub use script::Script;
pub use select::Select;
pub use write_csv::WriteCsv;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt::Debug;

use crate::config::WorkerConfig;
use crate::context::{Context, Value};
use crate::db::DbFacade;
use crate::errors::UnitError;
use crate::services::Services;

/// What a unit activation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Run the downstream units against `context`.
    Emit {
        /// The output context.
        context: Context,
        /// Invoke this unit again with the same input afterwards.
        has_more: bool,
    },
    /// Skip the downstream units for this activation.
    Filtered {
        /// Invoke this unit again with the same input afterwards.
        has_more: bool,
    },
    /// Nothing to emit; the unit is exhausted for this input.
    Done,
}

impl UnitOutcome {
    /// A single emission with no further elements.
    #[must_use]
    pub const fn emit(context: Context) -> Self {
        Self::Emit {
            context,
            has_more: false,
        }
    }

    /// Whether the unit asks to be invoked again.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        match self {
            Self::Emit { has_more, .. } | Self::Filtered { has_more } => *has_more,
            Self::Done => false,
        }
    }
}

/// Resources available to a unit while it executes.
pub struct UnitEnv<'a> {
    /// The batch's shared database transaction.
    pub db: &'a mut dyn DbFacade,
    /// Read-only worker configuration.
    pub config: &'a WorkerConfig,
    /// Shared collaborators.
    pub services: &'a Services,
    /// Id of the job being run.
    pub job_id: &'a str,
}

impl Debug for UnitEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitEnv")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

/// The declared configuration a unit instance reads from.
///
/// Attribute names are lower-cased; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitConfig {
    unit_type: String,
    attributes: IndexMap<String, String>,
    content: String,
}

impl UnitConfig {
    /// Creates a unit configuration.
    pub fn new<I, K, V>(unit_type: impl Into<String>, attributes: I, content: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            unit_type: unit_type.into(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
            content: content.into(),
        }
    }

    /// The declared type name.
    #[must_use]
    pub fn unit_type(&self) -> &str {
        &self.unit_type
    }

    /// The `label` attribute, else the type name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.attr("label").unwrap_or(&self.unit_type)
    }

    /// Gets an attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    /// Gets an attribute that must be present and non-blank.
    pub fn require(&self, name: &str) -> Result<&str, UnitError> {
        self.attr(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| UnitError::invalid_config(format!("missing attribute '{name}'")))
    }

    /// Gets a boolean attribute, falling back to `default` when absent.
    #[must_use]
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.attr(name).map_or(default, |value| {
            matches!(
                value.trim().to_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            )
        })
    }

    /// Splits a comma-separated attribute into trimmed names.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        self.attr(name)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The free-form text body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The declaration as a context, as seen by scripts.
    #[must_use]
    pub fn to_context(&self) -> Context {
        let mut ctx: Context = self
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        ctx.insert("type", self.unit_type.as_str());
        ctx.insert("label", self.label());
        ctx.insert("content", self.content.as_str());
        ctx
    }
}

/// A pipeline stage.
#[async_trait]
pub trait Unit: Send + Debug {
    /// Label used in logs and errors.
    fn label(&self) -> &str;

    /// Runs one activation against a private copy of the input context.
    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError>;
}

/// Position within a sequence, persisting across activations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    /// The index of the next element.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Emits the element at the cursor and advances it.
    ///
    /// An empty or exhausted sequence yields [`UnitOutcome::Done`].
    pub fn advance(&mut self, items: &[Value]) -> UnitOutcome {
        let Some(item) = items.get(self.position) else {
            return UnitOutcome::Done;
        };
        self.position += 1;
        UnitOutcome::Emit {
            context: element_context(item.clone()),
            has_more: self.position < items.len(),
        }
    }
}

/// Maps a sequence element to the context emitted for it. Maps are emitted
/// as-is; any other value is wrapped as `{ value: element }`.
#[must_use]
pub fn element_context(item: Value) -> Context {
    match item {
        Value::Map(ctx) => ctx,
        other => Context::new().with("value", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unit_config_attributes_are_case_insensitive() {
        let config = UnitConfig::new("Foreach", [("Path", "orders"), ("LABEL", "each order")], "");
        assert_eq!(config.attr("path"), Some("orders"));
        assert_eq!(config.attr("PATH"), Some("orders"));
        assert_eq!(config.label(), "each order");
    }

    #[test]
    fn test_label_falls_back_to_type() {
        let config = UnitConfig::new("Where", Vec::<(&str, &str)>::new(), "true");
        assert_eq!(config.label(), "Where");
    }

    #[test]
    fn test_require_rejects_blank() {
        let config = UnitConfig::new("ReadJSON", [("infile", "  ")], "");
        assert!(matches!(
            config.require("infile"),
            Err(UnitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_flag_and_list() {
        let config = UnitConfig::new("Mail", [("html", "No"), ("fields", "a, b,,c")], "");
        assert!(!config.flag("html", true));
        assert!(config.flag("missing", true));
        assert_eq!(config.list("fields"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cursor_walks_then_finishes() {
        let items = vec![Value::from(1), Value::from(2)];
        let mut cursor = Cursor::default();

        assert_eq!(
            cursor.advance(&items),
            UnitOutcome::Emit {
                context: Context::new().with("value", 1),
                has_more: true
            }
        );
        assert!(!cursor.advance(&items).has_more());
        assert_eq!(cursor.advance(&items), UnitOutcome::Done);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_cursor_over_empty_sequence() {
        assert_eq!(Cursor::default().advance(&[]), UnitOutcome::Done);
    }

    #[test]
    fn test_unit_config_to_context() {
        let config = UnitConfig::new("Script", [("threshold", "5")], "input.x = 1;");
        let ctx = config.to_context();
        assert_eq!(ctx.get_string("threshold"), "5");
        assert_eq!(ctx.get_string("type"), "Script");
        assert_eq!(ctx.get_string("label"), "Script");
    }
}
