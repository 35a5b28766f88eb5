//! Structured error types for wattrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Pid;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building or starting the sampler.
///
/// A running sampling iteration never produces one of these.
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("History capacity must be at least 1 (got {0})")]
    InvalidCapacity(usize),

    #[error("Sampling interval must be non-zero (got {0:?})")]
    InvalidInterval(Duration),

    #[error("No Tokio runtime available to run the sampling loop: {0}")]
    NoRuntime(String),
}

/// Faults reported by a counter source for a single sampling round.
#[derive(Error, Debug)]
pub enum CounterSourceError {
    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
