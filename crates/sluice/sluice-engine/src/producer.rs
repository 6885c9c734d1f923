//! Periodic producer: one value per tick, pushed into the channel.

use crate::worker::{Counters, Worker};
use crate::{CallbackError, DriverError, DriverStats, FailurePolicy};
use crossbeam_channel::{Receiver, select};
use sluice_channel::{BoundedChannel, ChannelError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const WORKER_NAME: &str = "sluice-producer";

/// Drives the producer side of a channel from its own timer.
///
/// Every `period` the worker calls the produce callback (outside the channel
/// lock) and hands the result to [`BoundedChannel::produce`]. Ticks run on a
/// single thread and never overlap; a tick that overruns its period delays
/// the next one instead of running concurrently with it.
pub struct ProducerDriver<T> {
    channel: Arc<BoundedChannel<T>>,
    period: Duration,
    worker: Worker,
}

impl<T: Send + 'static> ProducerDriver<T> {
    /// Starts producing into `channel` every `period`.
    ///
    /// # Errors
    /// - [`DriverError::ZeroPeriod`] if `period` is zero.
    /// - [`DriverError::Spawn`] if the worker thread cannot be started.
    pub fn spawn<F>(
        channel: Arc<BoundedChannel<T>>,
        period: Duration,
        policy: FailurePolicy,
        produce: F,
    ) -> Result<Self, DriverError>
    where
        F: FnMut() -> Result<T, CallbackError> + Send + 'static,
    {
        if period.is_zero() {
            return Err(DriverError::ZeroPeriod);
        }

        let worker_channel = channel.clone();
        let worker = Worker::spawn(WORKER_NAME, move |stop_rx, counters| {
            run(&worker_channel, period, policy, produce, &stop_rx, &counters)
        })?;

        info!(period_ms = period.as_millis() as u64, ?policy, "producer started");
        Ok(Self {
            channel,
            period,
            worker,
        })
    }
}

impl<T> ProducerDriver<T> {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn channel(&self) -> &Arc<BoundedChannel<T>> {
        &self.channel
    }

    /// `true` once the worker has exited on its own (callback failure or
    /// closed channel) or after [`stop`](Self::stop).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn stats(&self) -> DriverStats {
        self.worker.stats()
    }

    /// Cancels the timer, waits for an in-flight tick to finish and closes
    /// the channel. No produce callback runs after this returns.
    ///
    /// # Errors
    /// The failure that halted the worker, if it halted on its own.
    pub fn stop(mut self) -> Result<DriverStats, DriverError> {
        self.halt().map(|()| self.stats())
    }

    fn halt(&mut self) -> Result<(), DriverError> {
        let result = self.worker.join();
        if self.channel.close() {
            info!("producer stopped; channel closed");
        }
        result
    }
}

impl<T> Drop for ProducerDriver<T> {
    fn drop(&mut self) {
        if let Err(e) = self.halt() {
            warn!(error = %e, "producer exited with an unreported failure");
        }
    }
}

fn run<T, F>(
    channel: &BoundedChannel<T>,
    period: Duration,
    policy: FailurePolicy,
    mut produce: F,
    stop_rx: &Receiver<()>,
    counters: &Counters,
) -> Result<(), DriverError>
where
    F: FnMut() -> Result<T, CallbackError>,
{
    let ticker = crossbeam_channel::tick(period);

    loop {
        select! {
            recv(stop_rx) -> _ => {
                debug!("producer cancelled");
                return Ok(());
            }
            recv(ticker) -> _ => {}
        }

        counters.tick();
        let value = match produce() {
            Ok(value) => value,
            Err(source) => {
                counters.fail();
                match policy {
                    FailurePolicy::Skip => {
                        warn!(error = %source, "produce failed; skipping tick");
                        continue;
                    }
                    FailurePolicy::Stop => {
                        error!(error = %source, "produce failed; stopping producer");
                        channel.close();
                        return Err(DriverError::Produce(source));
                    }
                }
            }
        };

        match channel.produce(value) {
            Ok(()) => trace!(buffered = channel.len(), "produced"),
            Err(ChannelError::Closed) => {
                info!("channel closed; producer exiting");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}
