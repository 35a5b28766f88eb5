//! Pre-flight checks for wattrace
//!
//! Validates that the target can be sampled before the engine starts.
//! Provides clear, actionable error messages when requirements aren't met.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::domain::Pid;

/// Where RAPL package energy is read from.
const RAPL_ENERGY_PATH: &str = "/sys/class/powercap/intel-rapl:0/energy_uj";

/// Run all pre-flight checks for `pid`
///
/// # Errors
/// Returns an error if the process is gone or its threads cannot be listed.
pub fn run_preflight_checks(pid: Pid, quiet: bool) -> Result<()> {
    check_process_exists(pid)?;
    check_task_access(pid)?;
    if !quiet {
        check_energy_counters(Path::new(RAPL_ENERGY_PATH));
    }
    Ok(())
}

/// Check if the target process exists
///
/// # Errors
/// Returns an error if `/proc/<pid>` does not exist.
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.0);
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

/// Check if we can list and read the process's threads
///
/// # Errors
/// Returns an error if `/proc/<pid>/task` cannot be read.
pub fn check_task_access(pid: Pid) -> Result<()> {
    let task_path = format!("/proc/{}/task", pid.0);
    std::fs::read_dir(&task_path).with_context(|| {
        format!(
            "Cannot read {task_path}\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run with sudo)\n\
             - /proc is not mounted",
            pid.0
        )
    })?;
    Ok(())
}

/// Warn when package energy cannot be read. Sampling still works, but every
/// power figure will be zero.
///
/// Returns whether the counter is readable.
pub fn check_energy_counters(energy_path: &Path) -> bool {
    match std::fs::read_to_string(energy_path) {
        Ok(_) => true,
        Err(e) => {
            eprintln!(
                "warning: cannot read {} ({e}); power will read as zero.\n         \
                 RAPL energy usually requires root",
                energy_path.display()
            );
            false
        }
    }
}
