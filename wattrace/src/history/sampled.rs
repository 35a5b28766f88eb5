//! Historic power figures with a running maximum.

use super::RingBuffer;
use crate::domain::{Power, SamplerError};
use crate::power::PowerSample;

/// Bounded history of [`PowerSample`]s.
///
/// Storing is O(1). The maximum total power is tracked incrementally and only
/// rescanned when the sample holding it falls out of the buffer.
#[derive(Debug, Clone)]
pub struct SampledHistory {
    buffer: RingBuffer<PowerSample>,
    max_power: Power,
}

impl SampledHistory {
    /// # Errors
    /// Returns [`SamplerError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, SamplerError> {
        Ok(Self { buffer: RingBuffer::new(capacity)?, max_power: 0.0 })
    }

    #[allow(clippy::float_cmp)]
    pub fn add_sample(&mut self, sample: PowerSample) {
        let total = sample.total_power();
        let evicted = self.buffer.push(sample);

        match evicted {
            // The evicted sample was holding the maximum: rescan what is left.
            Some(old) if old.total_power() == self.max_power => {
                self.max_power = self
                    .buffer
                    .iter_unordered()
                    .map(PowerSample::total_power)
                    .fold(0.0, Power::max);
            }
            _ => self.max_power = self.max_power.max(total),
        }
    }

    /// Stored samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<PowerSample> {
        self.buffer.snapshot_chronological()
    }

    /// Largest total power among the stored samples (zero when empty).
    #[must_use]
    pub fn max_power(&self) -> Power {
        self.max_power
    }

    #[must_use]
    pub fn latest(&self) -> Option<&PowerSample> {
        self.buffer.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}
