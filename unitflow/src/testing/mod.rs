//! Testing utilities for unitflow pipelines.
//!
//! This module provides:
//! - An in-memory database facade and provider
//! - Recording and failing units, and a recording mailer
//! - A unit execution environment and job-file fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_done, assert_emitted, assert_filtered};
pub use fixtures::{job_xml, TestEnv};
pub use mocks::{
    FailingUnit, MemoryDb, MemoryDbProvider, RecordedCall, RecordingMailer, RecordingUnit,
};
