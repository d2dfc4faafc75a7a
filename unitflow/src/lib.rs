//! # Unitflow
//!
//! A scheduled batch engine running composable unit pipelines.
//!
//! A job is an ordered chain of units declared in a job file. On every
//! scheduler tick all eligible jobs run inside one shared database
//! transaction:
//!
//! - **Fan-out**: units such as `Foreach` and `Select` emit one context per
//!   element, and the rest of the chain runs once for each of them
//! - **Filtering**: `Where` prunes a branch without touching its siblings
//! - **Isolation**: every activation works on its own copy of the context
//! - **Atomic batches**: a failed commit rolls back the writes of every job
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use unitflow::prelude::*;
//!
//! let batch = JobBatch::from_xml_str(r#"
//!     <jobs>
//!       <job id="reorder">
//!         <unit type="Select">SELECT sku, qty FROM stock</unit>
//!         <unit type="Where">input.qty &lt; 5</unit>
//!         <unit type="Script">execute('INSERT INTO reorders VALUES (@sku)');</unit>
//!       </job>
//!     </jobs>"#)?;
//!
//! let report = batch.execute(&SqliteProvider, &registry, &config, &services).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod job;
pub mod mail;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod services;
pub mod template;
pub mod testing;
pub mod units;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::WorkerConfig;
    pub use crate::context::{Context, Value};
    pub use crate::db::{DbFacade, DbProvider, SqliteFacade, SqliteProvider};
    pub use crate::errors::{
        ConfigurationError, PipelineError, UnitError, WorkerError,
    };
    pub use crate::job::{BatchReport, Job, JobBatch, JobDefinition, JobOutcome};
    pub use crate::pipeline::PipelineExecutor;
    pub use crate::registry::{UnitRegistry, UnitStateTable};
    pub use crate::scheduler::{BatchRunner, Scheduler, WorkerService};
    pub use crate::services::Services;
    pub use crate::units::{Unit, UnitConfig, UnitEnv, UnitOutcome};
}
