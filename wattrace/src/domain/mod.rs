//! Domain model for wattrace
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    Address, CoreType, DisplayId, Energy, Pid, Power, Tid, DEFAULT_ADDRESS_MASK,
    PAC_STRIPPING_MASK,
};

pub use errors::{CounterSourceError, SamplerError};
