//! Bounded, pull-driven channel between one producer and one consumer.
//!
//! The producer pushes values on its own schedule; the consumer pulls one value
//! at a time on a different schedule. The two meet in a fixed-capacity FIFO:
//!
//! ```text
//!   produce(v) ──► [ buffer (≤ capacity) ] ──► sink.deliver(v)
//!                          ▲                        │
//!                          └──── request_next() ◄───┘
//! ```
//!
//! # Design
//! - **Overflow**: drop-oldest. The producer never blocks and the buffer never grows.
//! - **Underflow**: a request against an empty buffer is remembered as *pending*
//!   and satisfied by the next `produce`. The consumer never spins.
//! - **Single outstanding request**: a second request while one is pending is
//!   rejected with [`ChannelError::ProtocolViolation`].
//!
//! # Locking
//! `buffer`, `pending` and the attached sink live behind one mutex and are
//! only ever changed together. The critical section only decides *what* to
//! hand to *which* sink; the sink itself is invoked after the lock is dropped.

use crate::config::{ChannelConfig, push_drop_oldest};
use crate::{ChannelError, Sink};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A fixed-capacity channel with drop-oldest eviction and explicit pull-based
/// backpressure.
///
/// Share it between the two sides with an `Arc`. Exactly one consumer sink
/// may be attached at a time.
pub struct BoundedChannel<T> {
    capacity: usize,
    state: Mutex<State<T>>,
}

struct State<T> {
    buffer: VecDeque<T>,
    /// The consumer asked for a value and none was available yet.
    pending: bool,
    closed: bool,
    sink: Option<Arc<dyn Sink<T>>>,
    produced: u64,
    delivered: u64,
    evicted: u64,
}

/// A delivery decided under the lock, performed after it is released.
struct Handoff<T> {
    sink: Arc<dyn Sink<T>>,
    value: T,
}

impl<T> Handoff<T> {
    #[inline]
    fn run(self) {
        self.sink.deliver(self.value);
    }
}

/// Outcome of a successful [`BoundedChannel::request_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requested {
    /// A buffered value was handed to the sink before the call returned.
    Delivered,
    /// The buffer was empty; the next `produce` will satisfy the request.
    Pending,
}

/// Point-in-time snapshot of a channel's counters and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    /// Values accepted by `produce`.
    pub produced: u64,
    /// Values handed to the consumer sink.
    pub delivered: u64,
    /// Unread values discarded by drop-oldest eviction.
    pub evicted: u64,
    /// Values currently buffered.
    pub buffered: usize,
    pub pending: bool,
    pub closed: bool,
}

impl<T> State<T> {
    /// Resolves an outstanding request with the oldest buffered value.
    #[inline]
    fn take_pending(&mut self) -> Option<Handoff<T>> {
        if !self.pending {
            return None;
        }
        let sink = self.sink.clone()?;
        let value = self.buffer.pop_front()?;
        self.pending = false;
        self.delivered += 1;
        Some(Handoff { sink, value })
    }

    #[inline]
    fn check(&self, capacity: usize) {
        debug_assert!(self.buffer.len() <= capacity, "buffer exceeded capacity");
        debug_assert!(
            !self.pending || self.buffer.is_empty(),
            "pending request with buffered data"
        );
        debug_assert!(!self.pending || self.sink.is_some(), "pending request without a sink");
        debug_assert!(!(self.closed && self.pending), "pending request on a closed channel");
    }
}

impl<T> BoundedChannel<T> {
    /// Creates an empty, open channel with no consumer attached.
    pub fn new(cfg: ChannelConfig) -> Self {
        Self {
            capacity: cfg.capacity,
            state: Mutex::new(State {
                buffer: VecDeque::with_capacity(cfg.capacity),
                pending: false,
                closed: false,
                sink: None,
                produced: 0,
                delivered: 0,
                evicted: 0,
            }),
        }
    }

    /// Locks the shared state.
    ///
    /// No user code runs under this lock, so a poisoned mutex can only come
    /// from a failed invariant assertion; the state is still structurally
    /// sound and is recovered rather than propagated.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the consumer's delivery callback.
    ///
    /// # Errors
    /// - [`ChannelError::AlreadyAttached`] if a sink is already bound.
    /// - [`ChannelError::Closed`] if the channel was closed.
    pub fn attach<S>(&self, sink: S) -> Result<(), ChannelError>
    where
        S: Sink<T> + 'static,
    {
        let mut st = self.lock();
        if st.closed {
            return Err(ChannelError::Closed);
        }
        if st.sink.is_some() {
            return Err(ChannelError::AlreadyAttached);
        }
        st.sink = Some(Arc::new(sink));
        Ok(())
    }

    /// Unbinds the consumer and withdraws its outstanding request, if any.
    ///
    /// Buffered values are kept for the next consumer. A hand-off that was
    /// already decided before this call may still reach the old sink.
    ///
    /// Returns `true` if a sink was attached.
    pub fn detach(&self) -> bool {
        let sink = {
            let mut st = self.lock();
            st.pending = false;
            st.sink.take()
        };
        sink.is_some()
    }

    /// Offers one value to the channel.
    ///
    /// If the buffer is full the oldest unread value is evicted first. If the
    /// consumer has a pending request, the oldest buffered value is handed to
    /// its sink before this call returns, on the caller's thread.
    ///
    /// # Errors
    /// [`ChannelError::Closed`] if the channel was closed; `value` is dropped.
    pub fn produce(&self, value: T) -> Result<(), ChannelError> {
        let (handoff, evicted) = {
            let mut st = self.lock();
            if st.closed {
                return Err(ChannelError::Closed);
            }
            st.produced += 1;
            let evicted = push_drop_oldest(&mut st.buffer, self.capacity, value);
            if evicted.is_some() {
                st.evicted += 1;
            }
            let handoff = st.take_pending();
            st.check(self.capacity);
            (handoff, evicted)
        };
        drop(evicted);
        if let Some(h) = handoff {
            h.run();
        }
        Ok(())
    }

    /// Asks for the next value.
    ///
    /// With data buffered, the oldest value is delivered to the sink before
    /// this call returns. Otherwise the request is remembered and the next
    /// [`produce`](Self::produce) delivers to the sink instead. A pending
    /// request never times out.
    ///
    /// # Errors
    /// - [`ChannelError::Closed`] if the channel was closed.
    /// - [`ChannelError::Detached`] if no sink is attached.
    /// - [`ChannelError::ProtocolViolation`] if a request is already pending.
    pub fn request_next(&self) -> Result<Requested, ChannelError> {
        let handoff = {
            let mut st = self.lock();
            if st.closed {
                return Err(ChannelError::Closed);
            }
            let Some(sink) = st.sink.clone() else {
                return Err(ChannelError::Detached);
            };
            if st.pending {
                return Err(ChannelError::ProtocolViolation);
            }
            let Some(value) = st.buffer.pop_front() else {
                st.pending = true;
                st.check(self.capacity);
                return Ok(Requested::Pending);
            };
            st.delivered += 1;
            st.check(self.capacity);
            Handoff { sink, value }
        };
        handoff.run();
        Ok(Requested::Delivered)
    }

    /// Puts values that were handed to a consumer, but never processed, back
    /// at the front of the buffer in their original order.
    ///
    /// `values` must be oldest first and older than anything still buffered,
    /// which holds for a FIFO's undelivered tail. Each value is taken back out
    /// of the `delivered` count. Values that no longer fit are the oldest in
    /// the channel and are evicted. A pending request from a newly attached
    /// consumer is satisfied as by [`produce`](Self::produce).
    ///
    /// # Errors
    /// [`ChannelError::Closed`] if the channel was closed; `values` are dropped.
    pub fn requeue_front(&self, values: Vec<T>) -> Result<(), ChannelError> {
        let (handoff, evicted) = {
            let mut st = self.lock();
            if st.closed {
                return Err(ChannelError::Closed);
            }
            let mut evicted = Vec::new();
            for value in values.into_iter().rev() {
                st.delivered = st.delivered.saturating_sub(1);
                if st.buffer.len() >= self.capacity {
                    st.evicted += 1;
                    evicted.push(value);
                } else {
                    st.buffer.push_front(value);
                }
            }
            let handoff = st.take_pending();
            st.check(self.capacity);
            (handoff, evicted)
        };
        drop(evicted);
        if let Some(h) = handoff {
            h.run();
        }
        Ok(())
    }

    /// Closes the channel.
    ///
    /// Withdraws any pending request, discards buffered values, detaches the
    /// sink and signals end-of-stream to it exactly once. Later calls to
    /// `produce`, `request_next` and `attach` fail with
    /// [`ChannelError::Closed`].
    ///
    /// Returns `true` if this call performed the transition.
    pub fn close(&self) -> bool {
        let (sink, discarded) = {
            let mut st = self.lock();
            if st.closed {
                return false;
            }
            st.closed = true;
            st.pending = false;
            let discarded = std::mem::take(&mut st.buffer);
            (st.sink.take(), discarded)
        };
        drop(discarded);
        if let Some(sink) = sink {
            sink.closed();
        }
        true
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_attached(&self) -> bool {
        self.lock().sink.is_some()
    }

    pub fn stats(&self) -> ChannelStats {
        let st = self.lock();
        ChannelStats {
            produced: st.produced,
            delivered: st.delivered,
            evicted: st.evicted,
            buffered: st.buffer.len(),
            pending: st.pending,
            closed: st.closed,
        }
    }
}

impl<T: Clone> BoundedChannel<T> {
    /// Copies the buffered values, oldest first, without consuming them.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().buffer.iter().cloned().collect()
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
