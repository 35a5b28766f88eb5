//! Sampler configuration.

use std::time::Duration;

use super::counter_source::SampleRequest;
use crate::domain::{SamplerError, DEFAULT_ADDRESS_MASK};

/// Default time between two sampling rounds.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of power samples kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Settings for a [`SamplingEngine`](super::SamplingEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Nominal time between rounds. Power is still computed from the measured
    /// elapsed time, never from this value.
    pub sampling_interval: Duration,
    /// Number of power samples kept in history (at least 1).
    pub history_capacity: usize,
    /// Ask the counter source for dispatch queue names.
    pub retrieve_queue_names: bool,
    /// Ask the counter source for backtraces and feed them to the call tree.
    pub retrieve_backtraces: bool,
    /// Mask applied to every backtrace address before it is used as a key.
    pub address_mask: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            retrieve_queue_names: true,
            retrieve_backtraces: false,
            address_mask: DEFAULT_ADDRESS_MASK,
        }
    }
}

impl SamplerConfig {
    /// Check the configuration can drive a sampler.
    ///
    /// # Errors
    /// - [`SamplerError::InvalidCapacity`] for a zero history capacity
    /// - [`SamplerError::InvalidInterval`] for a zero sampling interval
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.history_capacity == 0 {
            return Err(SamplerError::InvalidCapacity(self.history_capacity));
        }
        if self.sampling_interval.is_zero() {
            return Err(SamplerError::InvalidInterval(self.sampling_interval));
        }
        Ok(())
    }

    /// What to ask the counter source for each round.
    #[must_use]
    pub fn request(&self) -> SampleRequest {
        SampleRequest {
            retrieve_queue_names: self.retrieve_queue_names,
            retrieve_backtraces: self.retrieve_backtraces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.sampling_interval, Duration::from_millis(500));
        assert_eq!(config.history_capacity, 60);
        assert!(config.retrieve_queue_names);
        assert!(!config.retrieve_backtraces);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SamplerConfig { history_capacity: 0, ..SamplerConfig::default() };
        assert!(matches!(config.validate(), Err(SamplerError::InvalidCapacity(0))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SamplerConfig { sampling_interval: Duration::ZERO, ..SamplerConfig::default() };
        assert!(matches!(config.validate(), Err(SamplerError::InvalidInterval(_))));
    }

    #[test]
    fn test_request_follows_flags() {
        let config = SamplerConfig {
            retrieve_queue_names: false,
            retrieve_backtraces: true,
            ..SamplerConfig::default()
        };
        let request = config.request();
        assert!(!request.retrieve_queue_names);
        assert!(request.retrieve_backtraces);
    }
}
