//! The worker thread shared by both drivers: spawn, cancel, join.

use crate::DriverError;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Counters a driver's worker updates as it runs.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    ticks: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn fail(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DriverStats {
        DriverStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a driver's activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverStats {
    /// User callback invocations (produce or consume).
    pub ticks: u64,
    /// Callback invocations that returned an error.
    pub failures: u64,
}

/// A named worker thread with a cancellation channel.
///
/// The worker body receives the stop receiver and must select on it in every
/// wait. Dropping the sender disconnects the receiver, which wakes the worker
/// whether it is idle on a timer or about to start one.
pub(crate) struct Worker {
    name: &'static str,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Result<(), DriverError>>>,
    counters: Arc<Counters>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self, DriverError>
    where
        F: FnOnce(Receiver<()>, Arc<Counters>) -> Result<(), DriverError> + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || body(stop_rx, worker_counters))
            .map_err(|source| DriverError::Spawn { name, source })?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            counters,
        })
    }

    pub(crate) fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Cancels the worker's current and future waits. Does not block.
    pub(crate) fn signal(&mut self) {
        self.stop_tx.take();
    }

    /// Waits for the worker to exit and returns what it reported.
    ///
    /// Called from the worker's own thread (a callback stopping its own
    /// driver), the handle is released without joining.
    pub(crate) fn join(&mut self) -> Result<(), DriverError> {
        self.signal();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            tracing::warn!(worker = self.name, "driver stopped from its own worker; not joining");
            return Ok(());
        }
        handle
            .join()
            .unwrap_or(Err(DriverError::Panicked(self.name)))
    }
}
