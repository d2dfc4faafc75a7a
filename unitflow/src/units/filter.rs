//! Predicate filter.

use async_trait::async_trait;

use super::{Unit, UnitConfig, UnitEnv, UnitOutcome};
use crate::context::{Context, Value};
use crate::errors::UnitError;
use crate::script::{CompiledScript, Global, ScriptScope};

const GLOBALS: &[Global] = &[Global::read_only("cfg"), Global::writable("unit")];

/// Passes its input downstream only when the predicate in its body is
/// truthy. The predicate is compiled on first use.
///
/// `unit` is a per-instance map scripts may use to keep state between
/// activations; it starts as the unit's own declaration.
#[derive(Debug)]
pub struct Where {
    config: UnitConfig,
    predicate: Option<Box<dyn CompiledScript>>,
    state: Context,
}

impl Where {
    /// Creates the unit.
    #[must_use]
    pub fn new(config: UnitConfig) -> Self {
        let state = config.to_context();
        Self {
            config,
            predicate: None,
            state,
        }
    }
}

#[async_trait]
impl Unit for Where {
    fn label(&self) -> &str {
        self.config.label()
    }

    async fn execute(
        &mut self,
        input: Context,
        env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        let predicate = match self.predicate.take() {
            Some(predicate) => predicate,
            None => env.services.scripts.compile(self.config.content(), GLOBALS)?,
        };

        let mut scope = ScriptScope {
            input: input.clone(),
            globals: Context::new()
                .with("cfg", env.config.to_context())
                .with("unit", std::mem::take(&mut self.state)),
            db: &mut *env.db,
        };
        let result = predicate.invoke(&mut scope);
        self.predicate = Some(predicate);
        if let Some(Value::Map(state)) = scope.globals.remove("unit") {
            self.state = state;
        }

        if result?.is_truthy() {
            Ok(UnitOutcome::emit(input))
        } else {
            Ok(UnitOutcome::Filtered { has_more: false })
        }
    }
}
