//! Test fixtures for unit and job testing.

use crate::config::WorkerConfig;
use crate::services::Services;
use crate::units::UnitEnv;

use super::MemoryDb;

/// Owns everything a [`UnitEnv`] borrows, so units can run in isolation.
#[derive(Debug)]
pub struct TestEnv {
    /// The database the units see.
    pub db: MemoryDb,
    /// Worker configuration.
    pub config: WorkerConfig,
    /// Collaborators; mail is disabled by default.
    pub services: Services,
    /// Job id reported to the units.
    pub job_id: String,
}

impl TestEnv {
    /// Creates an environment with an empty in-memory database.
    #[must_use]
    pub fn new() -> Self {
        // Local test servers must not be routed through a proxy from the environment.
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            db: MemoryDb::new(),
            config: WorkerConfig::default(),
            services: Services::new(http),
            job_id: "test-job".to_string(),
        }
    }

    /// Replaces the database.
    #[must_use]
    pub fn with_db(mut self, db: MemoryDb) -> Self {
        self.db = db;
        self
    }

    /// Borrows the environment for one unit call.
    pub fn env(&mut self) -> UnitEnv<'_> {
        UnitEnv {
            db: &mut self.db,
            config: &self.config,
            services: &self.services,
            job_id: &self.job_id,
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps job declarations in a `<jobs>` document.
#[must_use]
pub fn job_xml(jobs: &str) -> String {
    format!("<?xml version=\"1.0\"?>\n<jobs>\n{jobs}\n</jobs>")
}
