//! Power figures produced by the sampler.
//!
//! Everything here is immutable once built: a [`PowerSample`] is handed to the
//! history and to subscribers as a finished value.

use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::time::SystemTime;

use crate::domain::{CoreType, DisplayId, Power, Tid};

/// Power split by the core type it was drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CombinedPower {
    /// Power used by the performance cores.
    pub performance: Power,
    /// Power used by the efficiency cores.
    pub efficiency: Power,
}

impl CombinedPower {
    pub const ZERO: CombinedPower = CombinedPower { performance: 0.0, efficiency: 0.0 };

    #[must_use]
    pub fn new(performance: Power, efficiency: Power) -> Self {
        Self { performance, efficiency }
    }

    /// Power used by all cores.
    #[must_use]
    pub fn total(&self) -> Power {
        self.performance + self.efficiency
    }

    #[must_use]
    pub fn of(&self, core_type: CoreType) -> Power {
        match core_type {
            CoreType::Performance => self.performance,
            CoreType::Efficiency => self.efficiency,
        }
    }
}

impl Add for CombinedPower {
    type Output = CombinedPower;

    fn add(self, rhs: CombinedPower) -> CombinedPower {
        CombinedPower {
            performance: self.performance + rhs.performance,
            efficiency: self.efficiency + rhs.efficiency,
        }
    }
}

impl Sub for CombinedPower {
    type Output = CombinedPower;

    fn sub(self, rhs: CombinedPower) -> CombinedPower {
        CombinedPower {
            performance: self.performance - rhs.performance,
            efficiency: self.efficiency - rhs.efficiency,
        }
    }
}

impl Sum for CombinedPower {
    fn sum<I: Iterator<Item = CombinedPower>>(iter: I) -> Self {
        iter.fold(CombinedPower::ZERO, Add::add)
    }
}

/// The power used by a single thread during one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSample {
    pub tid: Tid,
    pub display_id: DisplayId,
    pub sample_time: SystemTime,
    /// pthread name, `None` when the thread is unnamed.
    pub pthread_name: Option<String>,
    /// Name of the dispatch queue the thread was serving, if any.
    pub dispatch_queue_name: Option<String>,
    pub power: CombinedPower,
}

impl ThreadSample {
    /// Build a thread sample, normalizing the raw names reported by the
    /// counter source.
    ///
    /// Empty pthread names and queue names that are empty or start with a
    /// newline are dropped.
    #[must_use]
    pub fn new(
        tid: Tid,
        display_id: DisplayId,
        sample_time: SystemTime,
        pthread_name: Option<String>,
        dispatch_queue_name: Option<String>,
        power: CombinedPower,
    ) -> Self {
        let pthread_name = pthread_name.filter(|name| !name.is_empty());
        let dispatch_queue_name =
            dispatch_queue_name.filter(|name| !name.is_empty() && !name.starts_with('\n'));
        Self { tid, display_id, sample_time, pthread_name, dispatch_queue_name, power }
    }

    /// The pthread name if there is one, `Thread <n>` otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.pthread_name {
            Some(name) => name.clone(),
            None => self.display_id.to_string(),
        }
    }
}

/// Result of one sampling round: combined power plus the per-thread breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerSample {
    /// Wall-clock time at which the round was taken.
    pub time: SystemTime,
    /// Power summed over every thread that had a baseline.
    pub all_threads_power: CombinedPower,
    pub thread_samples: Vec<ThreadSample>,
}

impl PowerSample {
    /// Empty sample with zero power.
    #[must_use]
    pub fn zero(time: SystemTime) -> Self {
        Self { time, all_threads_power: CombinedPower::ZERO, thread_samples: Vec::new() }
    }

    #[must_use]
    pub fn total_power(&self) -> Power {
        self.all_threads_power.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: Option<&str>, queue: Option<&str>) -> ThreadSample {
        ThreadSample::new(
            Tid(42),
            DisplayId(3),
            SystemTime::UNIX_EPOCH,
            name.map(str::to_string),
            queue.map(str::to_string),
            CombinedPower::new(1.0, 0.5),
        )
    }

    #[test]
    fn test_combined_power_arithmetic() {
        let a = CombinedPower::new(1.0, 2.0);
        let b = CombinedPower::new(0.5, 0.25);
        assert_eq!(a + b, CombinedPower::new(1.5, 2.25));
        assert_eq!(a - b, CombinedPower::new(0.5, 1.75));
        assert!((a.total() - 3.0).abs() < f64::EPSILON);
        assert!((a.of(CoreType::Efficiency) - 2.0).abs() < f64::EPSILON);

        let summed: CombinedPower = vec![a, b, CombinedPower::ZERO].into_iter().sum();
        assert_eq!(summed, a + b);
    }

    #[test]
    fn test_thread_sample_display_name() {
        assert_eq!(sample(Some("worker"), None).display_name(), "worker");
        assert_eq!(sample(None, None).display_name(), "Thread 3");
        // An empty pthread name counts as no name
        assert_eq!(sample(Some(""), None).display_name(), "Thread 3");
    }

    #[test]
    fn test_thread_sample_queue_name_normalization() {
        assert_eq!(
            sample(None, Some("com.apple.main-thread")).dispatch_queue_name.as_deref(),
            Some("com.apple.main-thread")
        );
        assert_eq!(sample(None, Some("")).dispatch_queue_name, None);
        assert_eq!(sample(None, Some("\ngarbage")).dispatch_queue_name, None);
    }

    #[test]
    fn test_zero_sample() {
        let zero = PowerSample::zero(SystemTime::UNIX_EPOCH);
        assert!(zero.thread_samples.is_empty());
        assert!(zero.total_power().abs() < f64::EPSILON);
    }
}
