//! Per-core CPU occupancy from `/proc/stat`.

// Tick counts are far below f64's exact integer range
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::path::PathBuf;

use crate::domain::SamplerError;
use crate::history::RingBuffer;

/// Tick counters of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CoreUsage {
    /// Ticks spent in the kernel.
    pub system: u64,
    /// Ticks spent in user code at normal priority.
    pub user: u64,
    /// Ticks spent in user code at nice priority.
    pub nice: u64,
    pub idle: u64,
}

impl CoreUsage {
    pub const ZERO: CoreUsage = CoreUsage { system: 0, user: 0, nice: 0, idle: 0 };

    fn busy(&self) -> u64 {
        self.system + self.user + self.nice
    }

    fn total(&self) -> u64 {
        self.busy() + self.idle
    }

    /// Share of non-idle ticks, from 0 to 1.
    #[must_use]
    pub fn usage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.busy() as f64 / total as f64,
        }
    }

    /// Share of kernel ticks, from 0 to 1.
    #[must_use]
    pub fn system_usage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.system as f64 / total as f64,
        }
    }
}

impl Add for CoreUsage {
    type Output = CoreUsage;

    fn add(self, rhs: CoreUsage) -> CoreUsage {
        CoreUsage {
            system: self.system + rhs.system,
            user: self.user + rhs.user,
            nice: self.nice + rhs.nice,
            idle: self.idle + rhs.idle,
        }
    }
}

/// Saturating: a counter that went backwards (CPU hotplug) reads as zero.
impl Sub for CoreUsage {
    type Output = CoreUsage;

    fn sub(self, rhs: CoreUsage) -> CoreUsage {
        CoreUsage {
            system: self.system.saturating_sub(rhs.system),
            user: self.user.saturating_sub(rhs.user),
            nice: self.nice.saturating_sub(rhs.nice),
            idle: self.idle.saturating_sub(rhs.idle),
        }
    }
}

impl Sum for CoreUsage {
    fn sum<I: Iterator<Item = CoreUsage>>(iter: I) -> Self {
        iter.fold(CoreUsage::ZERO, Add::add)
    }
}

/// Occupancy of every core between two readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuUsage {
    pub number_of_cores: usize,
    pub core_usages: Vec<CoreUsage>,
}

impl CpuUsage {
    /// All cores folded together.
    #[must_use]
    pub fn combined(&self) -> CoreUsage {
        self.core_usages.iter().copied().sum()
    }
}

/// Parse the per-core `cpuN` lines of `/proc/stat`, in file order.
///
/// # Errors
/// Returns an error if a core line has fewer than four counters.
pub fn parse_proc_stat(content: &str) -> Result<Vec<CoreUsage>> {
    content
        .lines()
        .filter(|line| line.starts_with("cpu") && !line.starts_with("cpu "))
        .map(|line| {
            let mut values = line.split_whitespace().skip(1).map(str::parse::<u64>);
            let mut next = |name: &str| -> Result<u64> {
                values
                    .next()
                    .with_context(|| format!("Missing {name} ticks in: {line}"))?
                    .with_context(|| format!("Invalid {name} ticks in: {line}"))
            };
            // Column order is user nice system idle
            let user = next("user")?;
            let nice = next("nice")?;
            let system = next("system")?;
            let idle = next("idle")?;
            Ok(CoreUsage { system, user, nice, idle })
        })
        .collect()
}

/// Tracks per-core usage across successive readings.
pub struct CpuUsageMonitor {
    stat_path: PathBuf,
    readings: RingBuffer<Vec<CoreUsage>>,
}

impl CpuUsageMonitor {
    /// Monitor reading `/proc/stat`, keeping `capacity` raw readings.
    ///
    /// # Errors
    /// Returns [`SamplerError::InvalidCapacity`] for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self, SamplerError> {
        Self::with_stat_path("/proc/stat", capacity)
    }

    /// Monitor reading an alternative stat file.
    ///
    /// # Errors
    /// Returns [`SamplerError::InvalidCapacity`] for a zero capacity.
    pub fn with_stat_path(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, SamplerError> {
        Ok(Self { stat_path: path.into(), readings: RingBuffer::new(capacity)? })
    }

    /// Take a reading and return usage since the previous one.
    ///
    /// The first call only records a baseline and returns `None`.
    ///
    /// # Errors
    /// Returns an error if the stat file cannot be read or parsed.
    pub fn sample(&mut self) -> Result<Option<CpuUsage>> {
        let content = fs::read_to_string(&self.stat_path)
            .with_context(|| format!("Failed to read {}", self.stat_path.display()))?;
        let current = parse_proc_stat(&content)?;

        let usage = self.readings.last().map(|previous| CpuUsage {
            number_of_cores: current.len(),
            core_usages: current
                .iter()
                .zip(previous.iter().copied().chain(std::iter::repeat(CoreUsage::ZERO)))
                .map(|(&now, before)| now - before)
                .collect(),
        });
        self.readings.push(current);
        Ok(usage)
    }

    /// Raw readings kept so far, oldest first.
    #[must_use]
    pub fn readings(&self) -> Vec<Vec<CoreUsage>> {
        self.readings.snapshot_chronological()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  30 0 12 200 0 0 0 0 0 0
cpu0 10 0 4 100 0 0 0 0 0 0
cpu1 20 0 8 100 0 0 0 0 0 0
intr 12345
ctxt 999
";

    #[test]
    fn test_parse_proc_stat() {
        let cores = parse_proc_stat(STAT).unwrap();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[1], CoreUsage { system: 8, user: 20, nice: 0, idle: 100 });
    }

    #[test]
    fn test_parse_truncated_line() {
        let err = parse_proc_stat("cpu0 1 2\n").unwrap_err();
        assert!(err.to_string().contains("system"));
    }

    #[test]
    fn test_usage_ratios() {
        let core = CoreUsage { system: 25, user: 50, nice: 0, idle: 25 };
        assert!((core.usage() - 0.75).abs() < 1e-12);
        assert!((core.system_usage() - 0.25).abs() < 1e-12);
        assert!(CoreUsage::ZERO.usage().abs() < f64::EPSILON);
    }

    #[test]
    fn test_monitor_reports_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, STAT).unwrap();

        let mut monitor = CpuUsageMonitor::with_stat_path(&path, 2).unwrap();
        assert!(monitor.sample().unwrap().is_none());

        fs::write(&path, "cpu0 20 0 4 110 0\ncpu1 20 0 18 110 0\n").unwrap();
        let usage = monitor.sample().unwrap().unwrap();
        assert_eq!(usage.number_of_cores, 2);
        assert_eq!(usage.core_usages[0], CoreUsage { system: 0, user: 10, nice: 0, idle: 10 });
        assert!((usage.core_usages[1].usage() - 0.5).abs() < 1e-12);
        assert_eq!(usage.combined().idle, 20);

        monitor.sample().unwrap();
        assert_eq!(monitor.readings().len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        assert!(CpuUsageMonitor::new(0).is_err());
    }
}
