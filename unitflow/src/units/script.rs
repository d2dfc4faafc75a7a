//! Imperative transform.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::{Context, Value};
use crate::errors::UnitError;
use crate::script::{CompiledScript, Global, ScriptScope};

const GLOBALS: &[Global] = &[
    Global::read_only("cfg"),
    Global::writable("unit"),
    Global::writable("hasMore"),
];

/// Runs the statement block in its body against the input and emits the
/// resulting context. Setting `hasMore = true` asks to be invoked again
/// with the same input; it is reset to false before every run.
#[derive(Debug)]
pub struct Script {
    config: UnitConfig,
    script: Option<Box<dyn CompiledScript>>,
    state: Context,
}

impl Script {
    /// Creates the unit.
    #[must_use]
    pub fn new(config: UnitConfig) -> Self {
        let state = config.to_context();
        Self {
            config,
            script: None,
            state,
        }
    }
}

#[async_trait]
impl Unit for Script {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let script = match self.script.take() {
            Some(script) => script,
            None => {
                tracing::debug!(unit = self.config.label(), "Compiling script");
                env.services.scripts.compile(self.config.content(), GLOBALS)?
            }
        };

        let mut scope = ScriptScope {
            input,
            globals: Context::new()
                .with("cfg", env.config.to_context())
                .with("unit", std::mem::take(&mut self.state))
                .with("hasmore", false),
            db: &mut *env.db,
        };
        let result = script.invoke(&mut scope);
        self.script = Some(script);
        if let Some(Value::Map(state)) = scope.globals.remove("unit") {
            self.state = state;
        }
        result?;

        let has_more = scope.globals.get("hasmore").is_some_and(Value::is_truthy);
        Ok(UnitOutcome::Emit {
            context: scope.input,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDb, TestEnv};
    use pretty_assertions::assert_eq;

    fn unit(body: &str) -> Script {
        Script::new(UnitConfig::new("Script", [("label", "calc")], body))
    }

    #[tokio::test]
    async fn test_emits_mutated_input() {
        let mut test_env = TestEnv::new();
        let outcome = unit("input.total = input.qty * input.price;")
            .execute(
                Context::new().with("qty", 3).with("price", 4),
                &mut test_env.env(),
            )
            .await
            .unwrap();

        let UnitOutcome::Emit { context, has_more } = outcome else {
            panic!("expected an emission");
        };
        assert_eq!(context.get("total"), Some(&Value::Integer(12)));
        assert!(!has_more);
    }

    #[tokio::test]
    async fn test_has_more_drives_repetition() {
        let mut test_env = TestEnv::new();
        let mut unit = unit(
            "unit.n = coalesce(unit.n, 0) + 1; input.page = unit.n; hasMore = unit.n < 3;",
        );

        let mut pages = Vec::new();
        loop {
            let outcome = unit.execute(Context::new(), &mut test_env.env()).await.unwrap();
            let has_more = outcome.has_more();
            if let UnitOutcome::Emit { context, .. } = outcome {
                pages.push(context.get_string("page"));
            }
            if !has_more {
                break;
            }
        }
        assert_eq!(pages, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_reads_config_and_writes_through_database() {
        let db = MemoryDb::new();
        let mut test_env = TestEnv::new().with_db(db.clone());
        test_env.config.settings.insert("region".into(), "north".into());

        unit("input.region = cfg.settings.region; execute('INSERT INTO audit VALUES (@region)');")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap();

        let commands = db.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].params.get_string("region"), "north");
    }

    #[tokio::test]
    async fn test_runtime_error_is_reported() {
        let mut test_env = TestEnv::new();
        let err = unit("input.x = 1 / 0;")
            .execute(Context::new(), &mut test_env.env())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }
}
