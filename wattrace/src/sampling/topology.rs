//! CPU topology utilities
//!
//! Utilities for querying CPU information from the /sys filesystem.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::domain::CoreType;

/// Parse a kernel cpulist like `"0-3"`, `"0-3,8-11"` or `"5"`.
///
/// # Errors
/// Returns an error if a CPU number is not an integer.
pub fn parse_cpu_list(content: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            // Range like "0-3"
            let start: u32 = start.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            cpus.extend(start..=end);
        } else {
            // Single CPU like "5"
            cpus.push(range.parse().with_context(|| format!("Bad CPU number: {range}"))?);
        }
    }

    Ok(cpus)
}

/// Get list of online CPU ids from `<sys>/devices/system/cpu/online`.
///
/// # Errors
/// Returns an error if the file is unreadable or malformed.
pub fn online_cpus(sys_root: &Path) -> Result<Vec<u32>> {
    let path = sys_root.join("devices/system/cpu/online");
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_cpu_list(&content)
}

/// Which CPUs are efficiency cores.
///
/// Hybrid x86 parts expose one PMU per core type; `cpu_atom` lists the
/// efficiency cores. Anything not listed there counts as a performance core,
/// which is also the answer on non-hybrid machines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreTopology {
    efficiency: BTreeSet<u32>,
}

impl CoreTopology {
    /// Read the topology below `sys_root` (normally `/sys`).
    #[must_use]
    pub fn detect(sys_root: &Path) -> Self {
        let path = sys_root.join("devices/cpu_atom/cpus");
        let efficiency = fs::read_to_string(&path)
            .ok()
            .and_then(|content| parse_cpu_list(&content).ok())
            .unwrap_or_default();
        Self { efficiency: efficiency.into_iter().collect() }
    }

    #[must_use]
    pub fn core_type_of(&self, cpu: u32) -> CoreType {
        if self.efficiency.contains(&cpu) {
            CoreType::Efficiency
        } else {
            CoreType::Performance
        }
    }

    #[must_use]
    pub fn is_hybrid(&self) -> bool {
        !self.efficiency.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3\n").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0-1,8-9").unwrap(), vec![0, 1, 8, 9]);
        assert_eq!(parse_cpu_list("5").unwrap(), vec![5]);
        assert!(parse_cpu_list("").unwrap().is_empty());
        assert!(parse_cpu_list("x-3").is_err());
    }

    #[test]
    fn test_online_cpus() {
        // This test relies on /sys being available (Linux only)
        let result = online_cpus(Path::new("/sys"));

        #[cfg(target_os = "linux")]
        {
            let cpus = result.unwrap();
            assert!(cpus.contains(&0));
            assert!(cpus.windows(2).all(|w| w[0] < w[1]));
        }

        #[cfg(not(target_os = "linux"))]
        {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_detect_hybrid_topology() {
        let sys = tempfile::tempdir().unwrap();
        let atom = sys.path().join("devices/cpu_atom");
        fs::create_dir_all(&atom).unwrap();
        fs::write(atom.join("cpus"), "4-7\n").unwrap();

        let topology = CoreTopology::detect(sys.path());
        assert!(topology.is_hybrid());
        assert_eq!(topology.core_type_of(0), CoreType::Performance);
        assert_eq!(topology.core_type_of(5), CoreType::Efficiency);
    }

    #[test]
    fn test_detect_without_hybrid_pmus() {
        let sys = tempfile::tempdir().unwrap();
        let topology = CoreTopology::detect(sys.path());
        assert!(!topology.is_hybrid());
        assert_eq!(topology.core_type_of(3), CoreType::Performance);
    }
}
