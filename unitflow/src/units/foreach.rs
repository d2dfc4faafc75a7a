//! Iterates a sequence found in the input context.

use async_trait::async_trait;

use super::{Cursor, Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::Context;
use crate::errors::UnitError;

/// Emits the elements of the list (or map values) at `path`, one per
/// activation.
///
/// The sequence is re-resolved from each input while the cursor position
/// persists for the lifetime of the instance, so a nested Foreach does not
/// restart for each outer element.
#[derive(Debug)]
pub struct Foreach {
    config: UnitConfig,
    cursor: Cursor,
}

impl Foreach {
    /// Creates the unit.
    #[must_use]
    pub fn new(config: UnitConfig) -> Self {
        Self {
            config,
            cursor: Cursor::default(),
        }
    }
}

#[async_trait]
impl Unit for Foreach {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let path = self.config.require("path")?;
        let Some(items) = input.select_values(path) else {
            tracing::debug!(unit = self.config.label(), path, "No sequence at path");
            return Ok(UnitOutcome::Done);
        };
        Ok(self.cursor.advance(&items))
    }
}
