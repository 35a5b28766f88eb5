//! Bounded storage for time-ordered samples
//!
//! - [`RingBuffer`]: fixed-capacity circular store, evicts the oldest item
//! - [`SampledHistory`]: ring buffer of power samples with an incrementally
//!   maintained maximum
//!
//! Memory is fixed at construction no matter how long sampling runs.

pub mod ring_buffer;
pub mod sampled;

pub use ring_buffer::RingBuffer;
pub use sampled::SampledHistory;
