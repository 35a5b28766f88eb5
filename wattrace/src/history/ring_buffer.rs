//! Fixed-capacity circular store.

use crate::domain::SamplerError;

/// Ring buffer that keeps the last `capacity` items pushed into it.
///
/// Storage is allocated once at construction; pushing never reallocates.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Slot the next push writes to. Once full this is also the oldest item.
    next: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` items.
    ///
    /// # Errors
    /// Returns [`SamplerError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, SamplerError> {
        if capacity == 0 {
            return Err(SamplerError::InvalidCapacity(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self { slots, next: 0, len: 0 })
    }

    /// Push an item, returning the evicted oldest item once the buffer is full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.next].replace(item);
        self.next = (self.next + 1) % self.slots.len();
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Most recently pushed item.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        let idx = (self.next + self.slots.len() - 1) % self.slots.len();
        self.slots[idx].as_ref()
    }

    /// Items oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let start = if self.is_full() { self.next } else { 0 };
        let (tail, head) = self.slots.split_at(start);
        head.iter().chain(tail.iter()).filter_map(Option::as_ref)
    }

    /// Items in no particular order. Skips the rotation of [`Self::iter`].
    pub fn iter_unordered(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the stored items, oldest to newest.
    #[must_use]
    pub fn snapshot_chronological(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Copy of the stored items in no particular order.
    #[must_use]
    pub fn snapshot_unordered(&self) -> Vec<T> {
        self.iter_unordered().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = RingBuffer::<u32>::new(0);
        assert!(matches!(result, Err(SamplerError::InvalidCapacity(0))));
    }

    #[test]
    fn test_partial_fill_keeps_push_order() {
        let mut buffer = RingBuffer::new(4).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.last(), None);

        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.snapshot_chronological(), vec![1, 2]);
        assert_eq!(buffer.last(), Some(&2));
    }

    #[test]
    fn test_overflow_retains_last_items_in_order() {
        for capacity in 1..=6 {
            let mut buffer = RingBuffer::new(capacity).unwrap();
            let pushes = capacity * 3 + 1;
            for i in 0..pushes {
                buffer.push(i);
            }

            let expected: Vec<usize> = (pushes - capacity..pushes).collect();
            assert_eq!(buffer.len(), capacity);
            assert!(buffer.is_full());
            assert_eq!(buffer.snapshot_chronological(), expected, "capacity {capacity}");
            assert_eq!(buffer.last(), Some(&(pushes - 1)));
        }
    }

    #[test]
    fn test_push_returns_evicted_item() {
        let mut buffer = RingBuffer::new(2).unwrap();
        assert_eq!(buffer.push("a"), None);
        assert_eq!(buffer.push("b"), None);
        assert_eq!(buffer.push("c"), Some("a"));
        assert_eq!(buffer.push("d"), Some("b"));
    }

    #[test]
    fn test_unordered_snapshot_has_same_items() {
        let mut buffer = RingBuffer::new(3).unwrap();
        for i in 0..5 {
            buffer.push(i);
        }
        let mut unordered = buffer.snapshot_unordered();
        unordered.sort_unstable();
        assert_eq!(unordered, vec![2, 3, 4]);
    }
}
