//! # wattrace - Per-Thread Energy Sampling
//!
//! wattrace periodically samples per-thread CPU energy and time counters of a
//! process, turns the counter deltas into power figures, and folds sampled
//! call stacks into an energy-weighted call tree that shows which code paths
//! spend the energy.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Target Process (any)                        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ /proc ticks, RAPL energy, backtraces
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    CounterSource (trait)                        │
//! │  • ProcfsCounterSource: task stat ticks × RAPL package energy   │
//! │  • any other producer of raw per-thread counters                │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ RawThreadSample per thread
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  SamplingEngine (this crate)                    │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ tokio timer  │──▶│ delta math   │──▶│SampledHistory│         │
//! │  │    loop      │   │ (W, Wh)      │   │ (ring + max) │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │ backtraces + energy                │
//! │                            ▼                                    │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │BacktraceTrie │◀──│ Attribution  │         │
//! │                     │ (call tree)  │   │ Cache (flat) │         │
//! │                     └──────────────┘   └──────┬───────┘         │
//! │                                               ▼                 │
//! │                                        SymbolResolver           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core
//!
//! - [`history`]: fixed-capacity ring buffer and the power sample history that
//!   tracks its maximum incrementally
//! - [`backtrace`]: merge trie of sampled stacks and the flat per-address view
//! - [`sampling`]: counter source boundary, configuration and the engine
//! - [`power`]: `PowerSample`, `ThreadSample` and `CombinedPower`
//! - [`domain`]: newtypes (`Pid`, `Tid`, `DisplayId`, `Address`) and errors
//!
//! ### Platform
//!
//! - [`symbolization`]: address → image/symbol via `/proc/<pid>/maps` and ELF
//!   symbol tables
//! - [`cpu_usage`]: per-core occupancy from `/proc/stat`
//! - [`process_lookup`], [`preflight`], [`cli`]: support for the `wattrace`
//!   binary
//!
//! ## Typical Usage
//!
//! ```bash
//! # Sample a process by name, twice a second, printing one line per sample
//! ./wattrace my-app
//!
//! # JSON lines for 30 seconds
//! ./wattrace --pid 1234 --json --duration 30
//! ```
//!
//! ## Key Concepts
//!
//! - **Core type**: performance vs efficiency cores on hybrid CPUs
//! - **Display id**: small stable number given to each thread on first sight
//! - **Call tree**: backtraces merged from the outermost frame; a node's energy
//!   is the energy of every stack through it
//! - **Flat view**: energy per address, each frame charged its stack's full
//!   energy

pub mod backtrace;
pub mod cli;
pub mod cpu_usage;
pub mod domain;
pub mod history;
pub mod power;
pub mod preflight;
pub mod process_lookup;
pub mod sampling;
pub mod symbolization;
