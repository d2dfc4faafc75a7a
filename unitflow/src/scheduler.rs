//! Tick-driven batch scheduling.
//!
//! A batch runs immediately, then again `interval` after the previous one
//! finishes, so runs never overlap and a slow batch delays the next tick.
//! Shutdown is only observed between batches.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::WorkerConfig;
use crate::db::DbProvider;
use crate::errors::WorkerError;
use crate::job::{BatchReport, JobBatch, JobOutcome};
use crate::registry::UnitRegistry;
use crate::services::Services;

/// Something that runs one batch per tick.
#[async_trait]
pub trait BatchRunner: Send {
    /// Runs one batch to completion.
    async fn run_batch(&mut self) -> Result<BatchReport, WorkerError>;
}

/// Serialized timer loop around a [`BatchRunner`].
#[derive(Debug)]
pub struct Scheduler<R> {
    runner: R,
    interval: Duration,
}

impl<R: BatchRunner> Scheduler<R> {
    /// Creates a scheduler.
    #[must_use]
    pub const fn new(runner: R, interval: Duration) -> Self {
        Self { runner, interval }
    }

    /// Runs a single batch and logs its outcome.
    pub async fn tick(&mut self) -> Result<BatchReport, WorkerError> {
        let result = self.runner.run_batch().await;
        match &result {
            Ok(report) => tracing::info!(
                run_id = %report.run_id,
                completed = report.count(|o| *o == JobOutcome::Completed),
                failed = report.count(|o| matches!(o, JobOutcome::Failed(_))),
                skipped = report.count(|o| *o == JobOutcome::Skipped),
                "Batch finished"
            ),
            Err(e) => tracing::error!(error = %e, "Batch failed"),
        }
        result
    }

    /// Runs batches until `shutdown` turns true or its sender is dropped.
    ///
    /// Returns the number of batches run.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        let mut batches = 0;
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            batches += 1;
            // Errors are logged by tick; the next tick is the only retry.
            let _ = self.tick().await;

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(batches, "Scheduler stopped");
        batches
    }
}

/// Loads the job file and runs it against the configured database.
pub struct WorkerService {
    config: WorkerConfig,
    jobs_path: PathBuf,
    provider: Box<dyn DbProvider>,
    registry: UnitRegistry,
    services: Services,
    batch: Option<JobBatch>,
}

impl std::fmt::Debug for WorkerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerService")
            .field("jobs_path", &self.jobs_path)
            .field("registry", &self.registry)
            .field("loaded", &self.batch.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkerService {
    /// Creates a service reading jobs from `config.scheduler.jobs_path`.
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        provider: Box<dyn DbProvider>,
        registry: UnitRegistry,
        services: Services,
    ) -> Self {
        let jobs_path = config.scheduler.jobs_path.clone();
        Self {
            config,
            jobs_path,
            provider,
            registry,
            services,
            batch: None,
        }
    }

    /// Reads jobs from `path` instead.
    #[must_use]
    pub fn with_jobs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.jobs_path = path.into();
        self.batch = None;
        self
    }

    /// The loaded job set, if any.
    #[must_use]
    pub const fn batch(&self) -> Option<&JobBatch> {
        self.batch.as_ref()
    }
}

#[async_trait]
impl BatchRunner for WorkerService {
    async fn run_batch(&mut self) -> Result<BatchReport, WorkerError> {
        if self.config.scheduler.reload_each_tick {
            self.batch = None;
        }
        let batch = match self.batch.take() {
            Some(batch) => batch,
            None => JobBatch::load(&self.jobs_path)?,
        };
        let batch = self.batch.insert(batch);
        batch
            .execute(
                self.provider.as_ref(),
                &self.registry,
                &self.config,
                &self.services,
            )
            .await
    }
}
