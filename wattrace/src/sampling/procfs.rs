//! Counter source backed by procfs and RAPL
//!
//! Linux has no per-thread energy counter, so one is synthesized:
//!
//! ```text
//! package energy delta (RAPL)  ×  thread tick delta / system tick delta
//!        └─ /sys/class/powercap/intel-rapl:0/energy_uj
//!                                    └─ /proc/<pid>/task/<tid>/stat (utime + stime)
//!                                                         └─ /proc/stat ("cpu" line)
//! ```
//!
//! Each share is added to a monotonic per-thread counter under the core type of
//! the CPU the thread last ran on. Without a readable RAPL domain the energy
//! counters stay at zero while CPU time still advances.
//!
//! When backtraces are requested, each thread reports a single frame: the user
//! program counter from `/proc/<pid>/task/<tid>/syscall`. The file needs ptrace
//! access to the target and has no counter while the thread is on a CPU.

// Tick and microjoule counts are far below f64's exact integer range
#![allow(clippy::cast_precision_loss)]

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::counter_source::{CoreCounters, CounterSource, RawThreadSample, SampleRequest};
use super::topology::CoreTopology;
use crate::domain::{CoreType, CounterSourceError, Pid, Tid};
use crate::process_lookup::extract_comm;

const MICROJOULES_PER_JOULE: f64 = 1_000_000.0;
const FALLBACK_CLOCK_TICKS: u64 = 100;
const RAPL_PACKAGE_DOMAIN: &str = "class/powercap/intel-rapl:0";

fn parse_error(path: &Path, reason: impl Into<String>) -> CounterSourceError {
    CounterSourceError::Parse { path: path.display().to_string(), reason: reason.into() }
}

#[allow(unsafe_code)]
fn clock_ticks_per_second() -> u64 {
    // SAFETY: sysconf only reads a system constant
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    u64::try_from(hz).ok().filter(|&hz| hz > 0).unwrap_or(FALLBACK_CLOCK_TICKS)
}

/// Package energy counter of one RAPL domain.
#[derive(Debug, Clone)]
struct RaplCounter {
    energy_path: PathBuf,
    max_energy_range_uj: u64,
}

impl RaplCounter {
    fn detect(sys_root: &Path) -> Option<Self> {
        let domain = sys_root.join(RAPL_PACKAGE_DOMAIN);
        let counter = Self {
            energy_path: domain.join("energy_uj"),
            max_energy_range_uj: fs::read_to_string(domain.join("max_energy_range_uj"))
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(u64::MAX),
        };
        match counter.read_uj() {
            Ok(_) => Some(counter),
            Err(e) => {
                debug!("RAPL energy counter unavailable: {e}");
                None
            }
        }
    }

    fn read_uj(&self) -> Result<u64, CounterSourceError> {
        let content = fs::read_to_string(&self.energy_path)?;
        content.trim().parse().map_err(|_| parse_error(&self.energy_path, "not an integer"))
    }

    /// Microjoules between two readings, accounting for one wraparound.
    fn delta_uj(&self, previous: u64, current: u64) -> u64 {
        if current >= previous {
            current - previous
        } else {
            self.max_energy_range_uj.saturating_sub(previous).saturating_add(current)
        }
    }
}

/// CPU time and last CPU of one task, from `/proc/<pid>/task/<tid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskStat {
    tid: Tid,
    comm: Option<String>,
    /// utime + stime, in clock ticks.
    ticks: u64,
    processor: u32,
}

/// Parse a stat line. Field numbers follow proc(5); everything after the
/// command name starts at field 3.
fn parse_task_stat(tid: Tid, content: &str, path: &Path) -> Result<TaskStat, CounterSourceError> {
    let close = content.rfind(')').ok_or_else(|| parse_error(path, "missing command name"))?;
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    let number = |number: usize, name: &str| -> Result<u64, CounterSourceError> {
        let value =
            fields.get(number - 3).ok_or_else(|| parse_error(path, format!("missing {name}")))?;
        value.parse().map_err(|_| parse_error(path, format!("invalid {name}")))
    };

    let utime = number(14, "utime")?;
    let stime = number(15, "stime")?;
    let processor = u32::try_from(number(39, "processor")?)
        .map_err(|_| parse_error(path, "processor out of range"))?;

    Ok(TaskStat { tid, comm: extract_comm(content).ok(), ticks: utime + stime, processor })
}

/// User program counter from a `syscall` file.
///
/// The line is `running`, `-1 <sp> <pc>` when blocked outside a syscall, or
/// `<nr> <six args> <sp> <pc>`. Only the last two shapes carry a counter.
fn parse_syscall_pc(content: &str) -> Option<u64> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let pc = fields.last()?;
    u64::from_str_radix(pc.strip_prefix("0x")?, 16).ok().filter(|&pc| pc != 0)
}

/// Total ticks of every CPU, from the aggregate `cpu` line of `/proc/stat`.
fn read_system_ticks(path: &Path) -> Result<u64, CounterSourceError> {
    let content = fs::read_to_string(path)?;
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| parse_error(path, "missing cpu line"))?;
    line.split_whitespace()
        .skip(1)
        .map(|value| value.parse::<u64>().map_err(|_| parse_error(path, "invalid tick count")))
        .sum()
}

fn slot(core_type: CoreType) -> usize {
    match core_type {
        CoreType::Performance => 0,
        CoreType::Efficiency => 1,
    }
}

/// Synthesized counters of one thread.
#[derive(Debug, Clone, Copy, Default)]
struct ThreadLedger {
    last_ticks: u64,
    ticks: [u64; 2],
    joules: [f64; 2],
}

/// Readings from the previous round for one process.
#[derive(Debug, Default)]
struct ProcessLedger {
    system_ticks: Option<u64>,
    package_uj: Option<u64>,
    threads: HashMap<Tid, ThreadLedger>,
}

/// [`CounterSource`] for Linux processes.
///
/// Dispatch queue names do not exist here and are always `None`. Backtraces
/// hold at most the sampled program counter. Cycle counts are not available
/// and stay at zero.
pub struct ProcfsCounterSource {
    proc_root: PathBuf,
    topology: CoreTopology,
    rapl: Option<RaplCounter>,
    ticks_per_second: u64,
    ledgers: Mutex<HashMap<Pid, ProcessLedger>>,
}

impl Default for ProcfsCounterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsCounterSource {
    /// Source reading the live `/proc` and `/sys`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Source reading alternative proc and sys trees.
    #[must_use]
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        let sys_root = sys_root.into();
        Self {
            proc_root: proc_root.into(),
            topology: CoreTopology::detect(&sys_root),
            rapl: RaplCounter::detect(&sys_root),
            ticks_per_second: clock_ticks_per_second(),
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// Override the kernel clock tick rate used to convert ticks to seconds.
    #[must_use]
    pub fn with_clock_ticks(mut self, ticks_per_second: u64) -> Self {
        self.ticks_per_second = ticks_per_second.max(1);
        self
    }

    /// Whether a RAPL package counter was found.
    #[must_use]
    pub fn has_energy_counters(&self) -> bool {
        self.rapl.is_some()
    }

    #[must_use]
    pub fn topology(&self) -> &CoreTopology {
        &self.topology
    }

    fn read_tasks(&self, pid: Pid) -> Result<Vec<TaskStat>, CounterSourceError> {
        let task_dir = self.proc_root.join(pid.0.to_string()).join("task");
        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.lock_ledgers().remove(&pid).is_some() {
                    debug!("Dropped counters of exited process {pid}");
                }
                return Err(CounterSourceError::ProcessNotFound(pid));
            }
            Err(e) => return Err(e.into()),
        };

        let mut tasks = Vec::new();
        for entry in entries.flatten() {
            let Ok(tid) = entry.file_name().to_string_lossy().parse::<u64>() else {
                continue;
            };
            let path = entry.path().join("stat");
            match fs::read_to_string(&path) {
                Ok(content) => tasks.push(parse_task_stat(Tid(tid), &content, &path)?),
                // Thread exited between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Thread {tid} of {pid} vanished");
                }
                Err(e) => debug!("Skipping thread {tid} of {pid}: {e}"),
            }
        }
        Ok(tasks)
    }

    fn lock_ledgers(&self) -> MutexGuard<'_, HashMap<Pid, ProcessLedger>> {
        self.ledgers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_program_counter(&self, pid: Pid, tid: Tid) -> Option<u64> {
        let path = self.proc_root.join(format!("{}/task/{}/syscall", pid.0, tid.0));
        match fs::read_to_string(&path) {
            Ok(content) => parse_syscall_pc(&content),
            Err(e) => {
                debug!("No program counter for thread {tid}: {e}");
                None
            }
        }
    }

    fn read_package_uj(&self) -> Option<u64> {
        let rapl = self.rapl.as_ref()?;
        rapl.read_uj()
            .map_err(|e| debug!("Failed to read {}: {e}", rapl.energy_path.display()))
            .ok()
    }

    fn counters(&self, ledger: &ThreadLedger, core_type: CoreType) -> CoreCounters {
        let idx = slot(core_type);
        CoreCounters {
            cycles: 0,
            energy: ledger.joules[idx],
            time: ledger.ticks[idx] as f64 / self.ticks_per_second as f64,
        }
    }
}

impl CounterSource for ProcfsCounterSource {
    fn raw_samples(
        &self,
        pid: Pid,
        request: SampleRequest,
    ) -> Result<Vec<RawThreadSample>, CounterSourceError> {
        let tasks = self.read_tasks(pid)?;
        let system_ticks = read_system_ticks(&self.proc_root.join("stat"))?;
        let package_uj = self.read_package_uj();

        let mut ledgers = self.lock_ledgers();
        let ledger = ledgers.entry(pid).or_default();

        let system_delta = ledger.system_ticks.map_or(0, |last| system_ticks.saturating_sub(last));
        let package_joules = match (&self.rapl, ledger.package_uj, package_uj) {
            (Some(rapl), Some(previous), Some(current)) => {
                rapl.delta_uj(previous, current) as f64 / MICROJOULES_PER_JOULE
            }
            _ => 0.0,
        };

        let mut threads = HashMap::with_capacity(tasks.len());
        let mut samples = Vec::with_capacity(tasks.len());
        for task in tasks {
            let known = ledger.threads.remove(&task.tid);
            let mut entry = known.unwrap_or_default();
            let idx = slot(self.topology.core_type_of(task.processor));

            let tick_delta = task.ticks.saturating_sub(entry.last_ticks);
            entry.ticks[idx] += tick_delta;
            if known.is_some() && system_delta > 0 {
                entry.joules[idx] += package_joules * tick_delta as f64 / system_delta as f64;
            }
            entry.last_ticks = task.ticks;

            samples.push(RawThreadSample {
                tid: task.tid,
                pthread_name: task.comm,
                dispatch_queue_name: None,
                performance: self.counters(&entry, CoreType::Performance),
                efficiency: self.counters(&entry, CoreType::Efficiency),
                backtrace: request
                    .retrieve_backtraces
                    .then(|| self.read_program_counter(pid, task.tid))
                    .flatten()
                    .map(|pc| vec![pc]),
            });
            threads.insert(task.tid, entry);
        }

        // Exited threads fall out here
        ledger.threads = threads;
        ledger.system_ticks = Some(system_ticks);
        ledger.package_uj = package_uj;

        Ok(samples)
    }
}
