// crates/server/src/jobs/mod.rs
//! Background job execution on the blocking pool.
//!
//! Provides:
//! - `JobRunner`: spawns task jobs off the async runtime and cleans up after them
//! - `ProgressReporter`: what a job uses to publish progress and errors
//! - `JobFailure`: structured failure a job returns to have an error emitted

pub mod reporter;
pub mod runner;
pub mod types;

pub use reporter::ProgressReporter;
pub use runner::JobRunner;
pub use types::{JobError, JobFailure, JobStatus};
