//! Channel configuration and the drop-oldest eviction rule.

use std::collections::VecDeque;

/// Configuration for a bounded channel.
///
/// The capacity is fixed at construction; the buffer never holds more than
/// `capacity` unread values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum number of buffered, unread values. Must be non-zero.
    pub capacity: usize,
}

impl ChannelConfig {
    /// Creates a new channel configuration with the specified capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    ///
    /// # Example
    /// ```
    /// use sluice_channel::ChannelConfig;
    /// let cfg = ChannelConfig::new(16);
    /// assert_eq!(cfg.capacity, 16);
    /// // ChannelConfig::new(0);   // Would panic: a channel must hold at least one value
    /// ```
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");
        Self { capacity }
    }
}

/// Pushes `value` onto the FIFO, evicting the stalest entry first when the
/// buffer is already at `capacity`.
///
/// # Returns
/// The evicted value, if any. The caller decides whether to count it.
///
/// # Example
///
/// ```text
/// capacity = 2, buffer = [A, B]
///
/// push C → evict A → buffer = [B, C], returns Some(A)
/// ```
#[inline]
pub(crate) fn push_drop_oldest<T>(buffer: &mut VecDeque<T>, capacity: usize, value: T) -> Option<T> {
    let evicted = if buffer.len() >= capacity {
        buffer.pop_front()
    } else {
        None
    };
    buffer.push_back(value);
    evicted
}
