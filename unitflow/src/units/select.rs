//! Iterates the rows of a database query.

use async_trait::async_trait;

use super::{Cursor, Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::{Context, Value};
use crate::errors::UnitError;

/// Runs its query once, caching the rows, then emits one row per
/// activation. Query parameters bind from the first input.
#[derive(Debug)]
pub struct Select {
    config: UnitConfig,
    rows: Option<Vec<Value>>,
    cursor: Cursor,
}

impl Select {
    /// Creates the unit.
    #[must_use]
    pub fn new(config: UnitConfig) -> Self {
        Self {
            config,
            rows: None,
            cursor: Cursor::default(),
        }
    }
}

#[async_trait]
impl Unit for Select {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        if self.rows.is_none() {
            let sql = self.config.content().trim();
            if sql.is_empty() {
                return Err(UnitError::invalid_config("empty query"));
            }
            let rows = env.db.query(sql, &input)?;
            tracing::info!(unit = self.config.label(), rows = rows.len(), "Cached query rows");
            self.rows = Some(rows.into_iter().map(Value::Map).collect());
        }

        let rows = self.rows.as_deref().unwrap_or_default();
        Ok(self.cursor.advance(rows))
    }
}
