//! Boundary to whatever produces raw per-thread counters.

use crate::domain::{CounterSourceError, Pid, Tid};

/// Monotonic counters of one thread on one core type.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoreCounters {
    /// Cycles executed. Zero when the source cannot count cycles.
    pub cycles: u64,
    /// Energy consumed, in joules.
    pub energy: f64,
    /// CPU time, in seconds.
    pub time: f64,
}

/// One thread as reported by a counter source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawThreadSample {
    pub tid: Tid,
    pub pthread_name: Option<String>,
    pub dispatch_queue_name: Option<String>,
    pub performance: CoreCounters,
    pub efficiency: CoreCounters,
    /// Return addresses, leaf first. Only present when requested.
    pub backtrace: Option<Vec<u64>>,
}

/// Optional data a counter source may attach to each thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleRequest {
    pub retrieve_queue_names: bool,
    pub retrieve_backtraces: bool,
}

/// Produces raw counter snapshots for a process.
///
/// Implementations are called from a blocking worker thread and may do
/// synchronous I/O. A process with no observable threads is an empty `Vec`,
/// not an error.
pub trait CounterSource: Send + Sync {
    /// Snapshot every thread of `pid`.
    ///
    /// # Errors
    /// Returns [`CounterSourceError`] when the process cannot be read. The
    /// sampler logs it and treats the round as having no threads.
    fn raw_samples(
        &self,
        pid: Pid,
        request: SampleRequest,
    ) -> Result<Vec<RawThreadSample>, CounterSourceError>;
}
