//! Change detection placeholder.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::Context;
use crate::errors::UnitError;

/// Meant to pass the input on only when the named `fields` differ from a
/// saved snapshot. No snapshot store exists, so every activation is
/// treated as unchanged and filtered.
#[derive(Debug)]
pub struct IfChange {
    config: UnitConfig,
    warned: bool,
}

impl IfChange {
    /// Creates the unit.
    #[must_use]
    pub const fn new(config: UnitConfig) -> Self {
        Self {
            config,
            warned: false,
        }
    }
}

#[async_trait]
impl Unit for IfChange {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        _input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        if !self.warned {
            self.warned = true;
            tracing::warn!(
                unit = self.config.label(),
                job = env.job_id,
                fields = ?self.config.list("fields"),
                "IfChange has no snapshot store; every input is treated as unchanged"
            );
        }
        Ok(UnitOutcome::Filtered { has_more: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_filtered, TestEnv};

    #[tokio::test]
    async fn test_always_filters() {
        let mut unit = IfChange::new(UnitConfig::new("IfChange", [("fields", "price")], ""));
        let mut test_env = TestEnv::new();

        for price in [1, 2] {
            let outcome = unit
                .execute(Context::new().with("price", price), &mut test_env.env())
                .await
                .unwrap();
            assert_filtered(&outcome);
            assert!(!outcome.has_more());
        }
        assert!(unit.warned);
    }
}
