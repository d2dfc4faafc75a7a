//! One transaction-scoped pass over the job set.

use chrono::{Local, NaiveTime};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use super::{parse_jobs, Job, JobDefinition, JobOutcome};
use crate::config::WorkerConfig;
use crate::db::{DbFacade, DbProvider};
use crate::errors::{
    BatchTransactionError, ConfigurationError, DbError, TransactionPhase, WorkerError,
};
use crate::observability::SpanTimer;
use crate::registry::UnitRegistry;
use crate::services::Services;
use crate::units::UnitEnv;

/// Outcome of one job within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Job id.
    pub id: String,
    /// How it ended.
    pub outcome: JobOutcome,
}

/// Summary of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Per-job outcomes, in declaration order.
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    /// Counts jobs with the given outcome kind.
    #[must_use]
    pub fn count(&self, matches: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|job| matches(&job.outcome)).count()
    }
}

/// The loaded job set.
///
/// Every job of a batch shares one database transaction; a job failure
/// stops that job only, while a failure to open or commit the transaction
/// rolls back the writes of every job.
#[derive(Debug, Default)]
pub struct JobBatch {
    jobs: Vec<Job>,
}

impl JobBatch {
    /// Creates a batch from parsed definitions.
    #[must_use]
    pub fn new(definitions: Vec<JobDefinition>) -> Self {
        Self {
            jobs: definitions.into_iter().map(Job::new).collect(),
        }
    }

    /// Loads a job file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read or is
    /// malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let batch = Self::from_xml_str(&text)?;
        tracing::info!(path = %path.display(), jobs = batch.jobs.len(), "Loaded job file");
        Ok(batch)
    }

    /// Parses job declarations from text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::JobSource`] for malformed declarations.
    pub fn from_xml_str(text: &str) -> Result<Self, ConfigurationError> {
        Ok(Self::new(parse_jobs(text)?))
    }

    /// The loaded jobs.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Opens a database through `provider` and runs the batch at the
    /// current local time.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::BatchTransaction`] if the database cannot be
    /// opened or the transaction cannot be started or committed.
    pub async fn execute(
        &mut self,
        provider: &dyn DbProvider,
        registry: &UnitRegistry,
        config: &WorkerConfig,
        services: &Services,
    ) -> Result<BatchReport, WorkerError> {
        let mut db = provider
            .open(&config.database)
            .map_err(|e| fail(TransactionPhase::Open, e))?;
        let now = Local::now().time();
        self.execute_with(db.as_mut(), now, registry, config, services)
            .await
    }

    /// Runs every job eligible at `now` inside one transaction on `db`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::BatchTransaction`] if the transaction cannot
    /// be started or committed; everything written is rolled back.
    pub async fn execute_with(
        &mut self,
        db: &mut dyn DbFacade,
        now: NaiveTime,
        registry: &UnitRegistry,
        config: &WorkerConfig,
        services: &Services,
    ) -> Result<BatchReport, WorkerError> {
        let run_id = Uuid::now_v7();
        let timer = SpanTimer::start(format!("batch:{run_id}"));
        tracing::info!(%run_id, jobs = self.jobs.len(), %now, "Starting batch");

        if let Err(e) = db.begin() {
            rollback(db, run_id);
            return Err(fail(TransactionPhase::Begin, e));
        }

        let mut reports = Vec::with_capacity(self.jobs.len());
        for job in &mut self.jobs {
            let window = job.definition().window;
            let outcome = if window.contains(now) {
                let id = job.id().to_string();
                let env = UnitEnv {
                    db: &mut *db,
                    config,
                    services,
                    job_id: &id,
                };
                job.execute(registry, env).await
            } else {
                tracing::debug!(job = job.id(), from = %window.from, to = %window.to, "Outside time window");
                JobOutcome::Skipped
            };
            reports.push(JobReport {
                id: job.id().to_string(),
                outcome,
            });
        }

        if let Err(e) = db.commit() {
            rollback(db, run_id);
            return Err(fail(TransactionPhase::Commit, e));
        }

        tracing::info!(%run_id, duration_ms = timer.finish(), "Batch committed");
        Ok(BatchReport {
            run_id,
            jobs: reports,
        })
    }
}

fn fail(phase: TransactionPhase, source: DbError) -> WorkerError {
    let error = BatchTransactionError::new(phase, source);
    tracing::error!(error = %error, "Batch transaction failed");
    error.into()
}

fn rollback(db: &mut dyn DbFacade, run_id: Uuid) {
    if let Err(e) = db.rollback() {
        tracing::error!(%run_id, error = %e, "Rollback failed");
    } else {
        tracing::warn!(%run_id, "Batch rolled back");
    }
}
