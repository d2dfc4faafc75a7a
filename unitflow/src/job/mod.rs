//! Jobs and job batches.

mod batch;
mod definition;
mod loader;

pub use batch::{BatchReport, JobBatch, JobReport};
pub use definition::{JobDefinition, NodeId, TimeWindow, UnitDefinition};
pub use loader::parse_jobs;

use serde::Serialize;

use crate::context::Context;
use crate::observability::SpanTimer;
use crate::pipeline::PipelineExecutor;
use crate::registry::{UnitRegistry, UnitStateTable};
use crate::units::UnitEnv;

/// How one job ended in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Outside its time window.
    Skipped,
    /// No units declared.
    Empty,
    /// The chain ran to completion.
    Completed,
    /// The chain was abandoned; the message describes why.
    Failed(String),
}

/// A job definition with the unit instances it has created.
#[derive(Debug)]
pub struct Job {
    definition: JobDefinition,
    states: UnitStateTable,
}

impl Job {
    /// Creates a job with no live unit instances.
    #[must_use]
    pub fn new(definition: JobDefinition) -> Self {
        Self {
            definition,
            states: UnitStateTable::new(),
        }
    }

    /// The job id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// The declaration.
    #[must_use]
    pub const fn definition(&self) -> &JobDefinition {
        &self.definition
    }

    /// Live unit instances.
    #[must_use]
    pub const fn states(&self) -> &UnitStateTable {
        &self.states
    }

    /// Runs the unit chain from an empty context.
    ///
    /// Failures stop this job only. They are logged and reported as
    /// [`JobOutcome::Failed`]; writes already made stay in the shared
    /// transaction.
    pub async fn execute(&mut self, registry: &UnitRegistry, env: UnitEnv<'_>) -> JobOutcome {
        let units = &self.definition.units;
        tracing::info!(job = %self.definition.id, units = units.len(), "Starting job");
        if units.is_empty() {
            return JobOutcome::Empty;
        }

        let timer = SpanTimer::start(format!("job:{}", self.definition.id));
        let UnitEnv {
            db,
            config,
            services,
            ..
        } = env;
        let env = UnitEnv {
            db: &mut *db,
            config,
            services,
            job_id: &self.definition.id,
        };
        let result = PipelineExecutor::new(registry)
            .run(units, Context::new(), &mut self.states, env)
            .await;
        let duration_ms = timer.finish();

        match result {
            Ok(stats) => {
                tracing::info!(
                    job = %self.definition.id,
                    activations = stats.activations,
                    filtered = stats.filtered,
                    duration_ms,
                    "Job finished"
                );
                JobOutcome::Completed
            }
            Err(e) => {
                tracing::error!(job = %self.definition.id, error = %e, duration_ms, "Job interrupted");
                JobOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_job_is_a_no_op() {
        let registry = UnitRegistry::with_builtin_units();
        let mut job = Job::new(JobDefinition::new("idle"));
        let mut test_env = TestEnv::new();

        assert_eq!(job.execute(&registry, test_env.env()).await, JobOutcome::Empty);
        assert!(job.states().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        let registry = UnitRegistry::with_builtin_units();
        let mut job = Job::new(
            JobDefinition::new("broken")
                .with_unit("Script", [("label", "calc")], "input.x = 1 / 0;"),
        );
        let mut test_env = TestEnv::new();

        let JobOutcome::Failed(message) = job.execute(&registry, test_env.env()).await else {
            panic!("expected a failure");
        };
        assert!(message.contains("'broken'"));
        assert!(message.contains("'calc'"));
    }

    #[tokio::test]
    async fn test_failures_name_the_job_not_the_caller() {
        let registry = UnitRegistry::with_builtin_units();
        let mut test_env = TestEnv::new();
        test_env.job_id = "scheduler".to_string();

        let none = Vec::<(&str, &str)>::new;
        let mut failing =
            Job::new(JobDefinition::new("nightly").with_unit("Script", none(), "input.x = 1 / 0;"));
        let mut unknown = Job::new(JobDefinition::new("nightly").with_unit("Teleport", none(), ""));

        for job in [&mut failing, &mut unknown] {
            let JobOutcome::Failed(message) = job.execute(&registry, test_env.env()).await else {
                panic!("expected a failure");
            };
            assert!(message.starts_with("Job 'nightly'"), "{message}");
            assert!(!message.contains("scheduler"));
        }
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(JobOutcome::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "error": "boom"}));
        let json = serde_json::to_value(JobOutcome::Completed).unwrap();
        assert_eq!(json, serde_json::json!({"status": "completed"}));
    }
}
