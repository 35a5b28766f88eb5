//! The sampling engine: timer loop, per-thread deltas, and fan-out to the
//! history, the call tree and subscribers.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::config::SamplerConfig;
use super::counter_source::{CoreCounters, CounterSource, RawThreadSample};
use crate::backtrace::{AttributionCache, Backtrace, BacktraceTrie, CallTreeNode, FlatEnergyEntry};
use crate::domain::{Address, DisplayId, Energy, Pid, Power, SamplerError, Tid};
use crate::history::SampledHistory;
use crate::power::{CombinedPower, PowerSample, ThreadSample};
use crate::symbolization::SymbolResolver;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters remembered from the previous round for one thread.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    performance: CoreCounters,
    efficiency: CoreCounters,
}

impl From<&RawThreadSample> for Baseline {
    fn from(raw: &RawThreadSample) -> Self {
        Self { performance: raw.performance, efficiency: raw.efficiency }
    }
}

/// Power and energy of one thread over one round.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ThreadDelta {
    power: CombinedPower,
    energy: Energy,
}

/// Power (watts) and energy (watt-hours) from two readings of one counter.
///
/// A delta that is zero or negative (counter reset) contributes nothing.
fn core_delta(previous: &CoreCounters, current: &CoreCounters, elapsed: Duration) -> (Power, Energy) {
    let joules = current.energy - previous.energy;
    if joules <= 0.0 {
        return (0.0, 0.0);
    }
    let seconds = elapsed.as_secs_f64();
    let power = if seconds > 0.0 { joules / seconds } else { 0.0 };
    (power, joules / SECONDS_PER_HOUR)
}

fn thread_delta(previous: &Baseline, current: &RawThreadSample, elapsed: Duration) -> ThreadDelta {
    let (p_power, p_energy) = core_delta(&previous.performance, &current.performance, elapsed);
    let (e_power, e_energy) = core_delta(&previous.efficiency, &current.efficiency, elapsed);
    ThreadDelta { power: CombinedPower::new(p_power, e_power), energy: p_energy + e_energy }
}

/// Bookkeeping carried from one round to the next.
#[derive(Debug, Default)]
struct SamplerState {
    previous: HashMap<Tid, Baseline>,
    display_ids: HashMap<Tid, DisplayId>,
    last_display_id: u32,
    last_instant: Option<Instant>,
}

impl SamplerState {
    fn display_id_for(&mut self, tid: Tid) -> DisplayId {
        if let Some(&id) = self.display_ids.get(&tid) {
            return id;
        }
        self.last_display_id += 1;
        let id = DisplayId(self.last_display_id);
        self.display_ids.insert(tid, id);
        id
    }
}

/// Periodically samples a process and aggregates what it sees.
///
/// Each round reads raw counters from a [`CounterSource`], turns the deltas
/// against the previous round into a [`PowerSample`], records it in the
/// bounded history and, when enabled, folds the threads' backtraces into the
/// call tree and flat attribution table.
///
/// Every aggregate sits behind its own lock. Readers get deep copies and can
/// poll freely while the loop runs. No aggregate lock is held while the
/// counter source or the symbol resolver is working. Rounds themselves are
/// serialized, so samples are committed in the order their counters were read.
pub struct SamplingEngine {
    config: SamplerConfig,
    source: Arc<dyn CounterSource>,
    /// Held for a whole round. Only writers take it.
    round: Mutex<()>,
    state: Mutex<SamplerState>,
    history: Mutex<SampledHistory>,
    trie: Mutex<BacktraceTrie>,
    attribution: AttributionCache,
    lifetime_energy: Mutex<Energy>,
    subscribers: Mutex<Vec<Sender<PowerSample>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SamplingEngine {
    /// Create an engine.
    ///
    /// # Errors
    /// Returns [`SamplerError`] if the configuration is invalid (zero history
    /// capacity or zero interval).
    pub fn new(
        config: SamplerConfig,
        source: Arc<dyn CounterSource>,
        resolver: Arc<dyn SymbolResolver>,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        let history = SampledHistory::new(config.history_capacity)?;
        Ok(Self {
            config,
            source,
            round: Mutex::new(()),
            state: Mutex::new(SamplerState::default()),
            history: Mutex::new(history),
            trie: Mutex::new(BacktraceTrie::new()),
            attribution: AttributionCache::new(resolver),
            lifetime_energy: Mutex::new(0.0),
            subscribers: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Start sampling `pid` on the current Tokio runtime.
    ///
    /// Does nothing if the loop is already running. The loop holds only a
    /// weak reference and ends on its own once the engine is dropped.
    ///
    /// # Errors
    /// Returns [`SamplerError::NoRuntime`] when called outside a Tokio runtime.
    pub fn start(self: &Arc<Self>, pid: Pid) -> Result<(), SamplerError> {
        let runtime = Handle::try_current().map_err(|e| SamplerError::NoRuntime(e.to_string()))?;

        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Sampler already running, ignoring start for {pid}");
            return Ok(());
        }

        let period = self.config.sampling_interval;
        let weak = Arc::downgrade(self);
        info!("Sampling {pid} every {}ms", period.as_millis());

        *task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                // The round runs to completion even if this task is aborted
                // while waiting on it.
                let round = tokio::task::spawn_blocking(move || {
                    engine.sample_once(pid);
                });
                if let Err(e) = round.await {
                    warn!("Sampling round for {pid} failed: {e}");
                }
            }
            debug!("Sampling loop for {pid} exited");
        }));
        Ok(())
    }

    /// Cancel the sampling loop. Returns immediately.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            info!("Sampling stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Take one sample now.
    pub fn sample_once(&self, pid: Pid) -> PowerSample {
        self.sample_at(pid, Instant::now(), SystemTime::now())
    }

    /// Take one sample, stamping it with the given clock readings.
    ///
    /// `now` drives the elapsed-time computation; `wall_time` is recorded on
    /// the sample. Useful for replaying recorded counters. A call made while
    /// another round is in progress waits for it to finish.
    pub fn sample_at(&self, pid: Pid, now: Instant, wall_time: SystemTime) -> PowerSample {
        let _round = lock(&self.round);
        let mut raw = match self.source.raw_samples(pid, self.config.request()) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Counter source failed for {pid}: {e}");
                Vec::new()
            }
        };
        raw.sort_by_key(|thread| thread.tid);

        let mut backtraces = Vec::new();
        let mut round_energy = 0.0;
        let sample = {
            let mut state = lock(&self.state);
            let elapsed = state.last_instant.map(|last| now.saturating_duration_since(last));

            let mut thread_samples = Vec::with_capacity(raw.len());
            let mut baselines = HashMap::with_capacity(raw.len());

            for mut thread in raw {
                let display_id = state.display_id_for(thread.tid);
                let delta = match (state.previous.get(&thread.tid), elapsed) {
                    (Some(previous), Some(elapsed)) => Some(thread_delta(previous, &thread, elapsed)),
                    _ => None,
                };
                baselines.insert(thread.tid, Baseline::from(&thread));

                if self.config.retrieve_backtraces {
                    if let Some(addresses) = thread.backtrace.take() {
                        backtraces.push(Backtrace::from_raw(
                            &addresses,
                            self.config.address_mask,
                            delta.map(|d| d.energy),
                        ));
                    }
                }

                if let Some(delta) = delta {
                    round_energy += delta.energy;
                    thread_samples.push(ThreadSample::new(
                        thread.tid,
                        display_id,
                        wall_time,
                        thread.pthread_name,
                        thread.dispatch_queue_name,
                        delta.power,
                    ));
                }
            }

            state.previous = baselines;
            state.last_instant = Some(now);

            PowerSample {
                time: wall_time,
                all_threads_power: thread_samples.iter().map(|t| t.power).sum(),
                thread_samples,
            }
        };

        debug!(
            "{pid}: {} threads, {:.3} W, {:.6} Wh",
            sample.thread_samples.len(),
            sample.total_power(),
            round_energy
        );

        lock(&self.history).add_sample(sample.clone());
        *lock(&self.lifetime_energy) += round_energy;
        self.insert_backtraces(&backtraces);
        self.publish(&sample);
        sample
    }

    /// Fold backtraces into the call tree and the flat attribution table.
    ///
    /// Symbols are resolved before the tree is locked. Backtraces without
    /// energy still shape the tree but are skipped by the flat table.
    pub fn insert_backtraces(&self, backtraces: &[Backtrace]) {
        for backtrace in backtraces {
            let frames = backtrace.frames();
            if frames.is_empty() {
                continue;
            }
            let symbols = self.attribution.resolve_all(frames);
            if let Some(energy) = backtrace.energy {
                self.attribution.accumulate_resolved(frames, energy, &symbols);
            }
            lock(&self.trie).insert(backtrace, |address| symbols.get(&address).cloned().flatten());
        }
    }

    /// Receive every future [`PowerSample`].
    ///
    /// Samples are dropped for a subscriber whose channel is full; the
    /// subscription ends when the receiver is dropped.
    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> Receiver<PowerSample> {
        let (tx, rx) = bounded(capacity.max(1));
        lock(&self.subscribers).push(tx);
        rx
    }

    fn publish(&self, sample: &PowerSample) {
        lock(&self.subscribers).retain(|tx| match tx.try_send(sample.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<PowerSample> {
        lock(&self.history).samples()
    }

    /// Highest total power among the retained samples.
    #[must_use]
    pub fn max_power(&self) -> Power {
        lock(&self.history).max_power()
    }

    #[must_use]
    pub fn latest_sample(&self) -> Option<PowerSample> {
        lock(&self.history).latest().cloned()
    }

    /// Snapshot of the whole call tree.
    #[must_use]
    pub fn call_tree(&self) -> Vec<CallTreeNode> {
        lock(&self.trie).roots()
    }

    /// Snapshot of the call tree below `path` (outermost frame first).
    #[must_use]
    pub fn call_subtree(&self, path: &[Address]) -> Option<CallTreeNode> {
        lock(&self.trie).subtree(path)
    }

    /// Snapshot of the flat attribution table.
    #[must_use]
    pub fn flat_entries(&self) -> Vec<FlatEnergyEntry> {
        self.attribution.entries()
    }

    /// Energy (watt-hours) summed over every round since creation or the last
    /// reset.
    #[must_use]
    pub fn lifetime_energy(&self) -> Energy {
        *lock(&self.lifetime_energy)
    }

    pub fn reset_lifetime_energy(&self) {
        *lock(&self.lifetime_energy) = 0.0;
    }

    /// Threads seen in the latest round.
    #[must_use]
    pub fn current_thread_count(&self) -> usize {
        lock(&self.state).previous.len()
    }

    /// Display id handed to `tid`, if it was ever seen.
    #[must_use]
    pub fn display_id(&self, tid: Tid) -> Option<DisplayId> {
        lock(&self.state).display_ids.get(&tid).copied()
    }
}

impl Drop for SamplingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
