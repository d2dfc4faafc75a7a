//! Recursive pipeline execution.
//!
//! Unit `i` of a chain behaves like loop-nesting level `i`: every emission
//! runs the rest of the chain to completion before the unit is invoked
//! again, a filtered activation prunes only its own branch, and a unit
//! asking for more is re-invoked with its original input.


use futures::future::{BoxFuture, FutureExt};

use crate::context::Context;
use crate::errors::PipelineError;
use crate::job::UnitDefinition;
use crate::registry::{UnitRegistry, UnitStateTable};
use crate::units::{Unit, UnitEnv, UnitOutcome};

/// Counters collected while a chain runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Unit activations performed.
    pub activations: usize,
    /// Activations that were filtered.
    pub filtered: usize,
}

struct RunScope<'s, 'e> {
    states: &'s mut UnitStateTable,
    env: UnitEnv<'e>,
    stats: RunStats,
}

/// Drives unit chains against a registry.
#[derive(Debug, Clone, Copy)]
pub struct PipelineExecutor<'r> {
    registry: &'r UnitRegistry,
}

impl<'r> PipelineExecutor<'r> {
    /// Creates an executor over `registry`.
    #[must_use]
    pub const fn new(registry: &'r UnitRegistry) -> Self {
        Self { registry }
    }

    /// Runs `units` depth-first from `input`.
    ///
    /// Instances come from `states`, so iteration state carries over from
    /// earlier runs against the same table.
    ///
    /// # Errors
    ///
    /// Returns the first unknown unit type or unit failure; the rest of the
    /// chain is abandoned.
    pub async fn run(
        &self,
        units: &[UnitDefinition],
        input: Context,
        states: &mut UnitStateTable,
        env: UnitEnv<'_>,
    ) -> Result<RunStats, PipelineError> {
        let mut scope = RunScope {
            states,
            env,
            stats: RunStats::default(),
        };
        run_level(self.registry, units, input, &mut scope).await?;
        Ok(scope.stats)
    }
}

fn run_level<'a, 's, 'e>(
    registry: &'a UnitRegistry,
    units: &'a [UnitDefinition],
    input: Context,
    scope: &'a mut RunScope<'s, 'e>,
) -> BoxFuture<'a, Result<(), PipelineError>> {
    async move {
        let Some((definition, rest)) = units.split_first() else {
            return Ok(());
        };
        let mut unit = scope.states.resolve(registry, definition)?;
        let job = definition.id.job.as_str();
        let result = activate(registry, job, unit.as_mut(), rest, &input, scope).await;
        scope.states.release(definition, unit);
        result
    }
    .boxed()
}

async fn activate(
    registry: &UnitRegistry,
    job: &str,
    unit: &mut dyn Unit,
    rest: &[UnitDefinition],
    input: &Context,
    scope: &mut RunScope<'_, '_>,
) -> Result<(), PipelineError> {
    tracing::info!(job, unit = unit.label(), "Executing unit");
    tracing::debug!(job, unit = unit.label(), input = %input.pretty(), "Unit input");

    loop {
        scope.stats.activations += 1;
        let outcome = unit
            .execute(input.clone(), &mut scope.env)
            .await
            .map_err(|source| {
                tracing::error!(
                    job,
                    unit = unit.label(),
                    error = %source,
                    "Unit failed"
                );
                PipelineError::UnitExecution {
                    job: job.to_string(),
                    unit: unit.label().to_string(),
                    source,
                }
            })?;

        let has_more = outcome.has_more();
        match outcome {
            UnitOutcome::Emit { context, .. } => {
                run_level(registry, rest, context, scope).await?;
            }
            UnitOutcome::Filtered { .. } => {
                scope.stats.filtered += 1;
            }
            UnitOutcome::Done => {}
        }

        if !has_more {
            return Ok(());
        }
        tracing::info!(job, unit = unit.label(), "Continuing unit");
    }
}
