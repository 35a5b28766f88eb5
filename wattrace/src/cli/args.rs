//! CLI argument definitions

use clap::Parser;
use std::time::Duration;

use crate::sampling::{SamplerConfig, DEFAULT_HISTORY_CAPACITY};

#[derive(Parser, Debug)]
#[command(
    name = "wattrace",
    about = "Sample per-thread CPU power of a running process",
    after_help = "\
EXAMPLES:
    sudo wattrace my-app                     Find the process by name
    sudo wattrace --pid 1234                 Explicit PID
    sudo wattrace my-app --json --duration 30
                                             JSON lines for 30 seconds

Energy is read from RAPL, which usually needs root."
)]
pub struct Args {
    /// Process name to sample (auto-detects PID)
    #[arg(value_name = "PROCESS", conflicts_with = "pid")]
    pub process: Option<String>,

    /// Process ID to sample
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Milliseconds between samples
    #[arg(short, long, default_value = "500", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Number of samples kept in history
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY, value_parser = parse_capacity)]
    pub history: usize,

    /// Collect backtraces and report the energy-weighted call tree
    #[arg(long)]
    pub backtraces: bool,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Print one JSON object per sample instead of text
    #[arg(long)]
    pub json: bool,

    /// Number of entries shown in the final attribution summary
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_capacity(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("history must hold at least one sample".to_string()),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(e.to_string()),
    }
}

impl Args {
    /// Sampler settings selected by these arguments.
    #[must_use]
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            sampling_interval: Duration::from_millis(self.interval_ms),
            history_capacity: self.history,
            retrieve_backtraces: self.backtraces,
            ..SamplerConfig::default()
        }
    }

    /// `None` when unlimited.
    #[must_use]
    pub fn duration_limit(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["wattrace", "my-app"]).unwrap();
        assert_eq!(args.process.as_deref(), Some("my-app"));
        assert_eq!(args.sampler_config(), SamplerConfig::default());
        assert!(args.duration_limit().is_none());
    }

    #[test]
    fn test_sampler_config_from_flags() {
        let args = Args::try_parse_from([
            "wattrace",
            "--pid",
            "42",
            "--interval-ms",
            "250",
            "--history",
            "10",
            "--backtraces",
            "--duration",
            "5",
        ])
        .unwrap();
        let config = args.sampler_config();
        assert_eq!(args.pid, Some(42));
        assert_eq!(config.sampling_interval, Duration::from_millis(250));
        assert_eq!(config.history_capacity, 10);
        assert!(config.retrieve_backtraces);
        assert_eq!(args.duration_limit(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Args::try_parse_from(["wattrace", "--pid", "1", "--history", "0"]).is_err());
        assert!(Args::try_parse_from(["wattrace", "--pid", "1", "--interval-ms", "0"]).is_err());
        assert!(Args::try_parse_from(["wattrace", "app", "--pid", "1"]).is_err());
    }
}
