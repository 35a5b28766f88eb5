//! # Sampling
//!
//! Turns monotonically increasing per-thread counters into power figures.
//!
//! ```text
//!  CounterSource ──raw_samples()──▶ SamplingEngine ──▶ SampledHistory
//!  (procfs, test)                    │  deltas vs      ──▶ BacktraceTrie
//!                                    │  previous round ──▶ AttributionCache
//!                                    └──────────────────▶ subscribers
//! ```
//!
//! ## Module Structure
//!
//! - **`counter_source`**: the [`CounterSource`] trait and the raw types it
//!   returns.
//! - **`config`**: [`SamplerConfig`].
//! - **`engine`**: [`SamplingEngine`], the delta arithmetic and timer loop.
//! - **`procfs`**: [`ProcfsCounterSource`], a Linux counter source built from
//!   `/proc` tick counts and RAPL package energy.
//! - **`topology`**: which CPUs are performance or efficiency cores.
//!
//! ## Units
//!
//! Counter sources report joules. The engine reports power in watts and
//! energy in watt-hours, dividing by the *measured* time between rounds.

pub mod config;
pub mod counter_source;
pub mod engine;
pub mod procfs;
pub mod topology;

pub use config::{SamplerConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_SAMPLING_INTERVAL};
pub use counter_source::{CoreCounters, CounterSource, RawThreadSample, SampleRequest};
pub use engine::SamplingEngine;
pub use procfs::ProcfsCounterSource;
pub use topology::CoreTopology;
