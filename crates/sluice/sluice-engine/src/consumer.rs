//! Pull-driven consumer: request, process, wait, request again.

use crate::worker::{Counters, Worker};
use crate::{CallbackError, DriverError, DriverStats, FailurePolicy};
use crossbeam_channel::{Receiver, Sender, TryRecvError, select};
use sluice_channel::{BoundedChannel, ChannelError, Requested, Sink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const WORKER_NAME: &str = "sluice-consumer";

/// What the channel hands to the consumer's worker.
enum Delivery<T> {
    Value(T),
    Closed,
}

/// The sink attached to the channel. It only forwards, so a delivery made
/// from inside the producer's `produce` call costs one queue push and the
/// consume callback always runs on the consumer's own thread.
struct Forward<T> {
    tx: Sender<Delivery<T>>,
}

impl<T: Send> Sink<T> for Forward<T> {
    fn deliver(&self, value: T) {
        if self.tx.send(Delivery::Value(value)).is_err() {
            debug!("consumer worker gone; delivered value dropped");
        }
    }

    fn closed(&self) {
        if self.tx.send(Delivery::Closed).is_err() {
            debug!("consumer worker gone; end-of-stream dropped");
        }
    }
}

/// Drives the consumer side of a channel.
///
/// On start the worker attaches to the channel and issues the first request.
/// Each delivered value is passed to the consume callback; the worker then
/// waits `period` on a one-shot timer before requesting again, so at most one
/// request is ever outstanding.
pub struct ConsumerDriver<T> {
    channel: Option<Arc<BoundedChannel<T>>>,
    period: Duration,
    worker: Worker,
    /// Second handle on the worker's queue, drained on [`detach`](Self::detach).
    deliveries: Receiver<Delivery<T>>,
}

impl<T: Send + 'static> ConsumerDriver<T> {
    /// Attaches to `channel` and starts consuming.
    ///
    /// # Errors
    /// - [`DriverError::ZeroPeriod`] if `period` is zero.
    /// - [`DriverError::Channel`] if the channel is closed or already has a consumer.
    /// - [`DriverError::Spawn`] if the worker thread cannot be started.
    pub fn spawn<F>(
        channel: Arc<BoundedChannel<T>>,
        period: Duration,
        policy: FailurePolicy,
        consume: F,
    ) -> Result<Self, DriverError>
    where
        F: FnMut(T) -> Result<(), CallbackError> + Send + 'static,
    {
        if period.is_zero() {
            return Err(DriverError::ZeroPeriod);
        }

        let (tx, deliveries) = crossbeam_channel::unbounded();
        channel.attach(Forward { tx })?;

        let worker_channel = channel.clone();
        let worker_deliveries = deliveries.clone();
        let worker = Worker::spawn(WORKER_NAME, move |stop_rx, counters| {
            run(
                &worker_channel,
                period,
                policy,
                consume,
                &worker_deliveries,
                &stop_rx,
                &counters,
            )
        })
        .inspect_err(|_| {
            channel.detach();
        })?;

        info!(period_ms = period.as_millis() as u64, ?policy, "consumer started");
        Ok(Self {
            channel: Some(channel),
            period,
            worker,
            deliveries,
        })
    }
}

impl<T> ConsumerDriver<T> {
    pub fn period(&self) -> Duration {
        self.period
    }

    /// `true` once the worker has exited on its own (callback failure or
    /// closed channel) or after [`stop`](Self::stop) / [`detach`](Self::detach).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn stats(&self) -> DriverStats {
        self.worker.stats()
    }

    /// Cancels any pending delay, withdraws the outstanding request, closes
    /// the channel and waits for the worker. No consume callback runs after
    /// this returns.
    ///
    /// # Errors
    /// The failure that halted the worker, if it halted on its own.
    pub fn stop(mut self) -> Result<DriverStats, DriverError> {
        self.halt(true).map(|()| self.stats())
    }

    /// Like [`stop`](Self::stop) but leaves the channel open with its
    /// buffered values, so another consumer can attach.
    ///
    /// Values the channel already handed over but the worker never consumed
    /// are put back at the front of the buffer, oldest first.
    pub fn detach(mut self) -> Result<DriverStats, DriverError> {
        self.halt(false).map(|()| self.stats())
    }

    fn halt(&mut self, close: bool) -> Result<(), DriverError> {
        self.worker.signal();
        let Some(channel) = self.channel.take() else {
            return self.worker.join();
        };
        channel.detach();
        if close && channel.close() {
            info!("consumer stopped; channel closed");
        }
        let result = self.worker.join();
        if !close {
            self.return_undelivered(&channel);
        }
        result
    }

    /// Moves everything left in the worker's queue back into the channel.
    ///
    /// The only sender lives in the `Forward` sink. Once the channel has
    /// dropped it and any hand-off decided before `detach` has finished, the
    /// queue disconnects and this loop ends.
    fn return_undelivered(&self, channel: &BoundedChannel<T>) {
        let undelivered: Vec<T> = self
            .deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Value(value) => Some(value),
                Delivery::Closed => None,
            })
            .collect();
        if undelivered.is_empty() {
            return;
        }

        let count = undelivered.len();
        match channel.requeue_front(undelivered) {
            Ok(()) => debug!(count, "returned undelivered values to the channel"),
            Err(e) => debug!(count, error = %e, "undelivered values dropped"),
        }
    }
}

impl<T> Drop for ConsumerDriver<T> {
    fn drop(&mut self) {
        if let Err(e) = self.halt(true) {
            warn!(error = %e, "consumer exited with an unreported failure");
        }
    }
}

/// The driver signalled stop. Stop is only ever sent by disconnecting.
fn cancelled(stop_rx: &Receiver<()>) -> bool {
    matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected))
}

/// Issues one request. `Ok(false)` means the worker should exit quietly.
fn request<T>(channel: &BoundedChannel<T>, stop_rx: &Receiver<()>) -> Result<bool, DriverError> {
    match channel.request_next() {
        Ok(Requested::Delivered) => {
            trace!("requested; value ready");
            Ok(true)
        }
        Ok(Requested::Pending) => {
            trace!("requested; waiting for producer");
            Ok(true)
        }
        Err(ChannelError::Closed) => Ok(false),
        // `halt` signals before it detaches, so this is our own shutdown.
        Err(ChannelError::Detached) if cancelled(stop_rx) => Ok(false),
        Err(e) => {
            error!(error = %e, "request rejected; stopping consumer");
            channel.close();
            Err(e.into())
        }
    }
}

fn run<T, F>(
    channel: &BoundedChannel<T>,
    period: Duration,
    policy: FailurePolicy,
    mut consume: F,
    deliveries: &Receiver<Delivery<T>>,
    stop_rx: &Receiver<()>,
    counters: &Counters,
) -> Result<(), DriverError>
where
    F: FnMut(T) -> Result<(), CallbackError>,
{
    if !request(channel, stop_rx)? {
        info!("consumer exiting before first delivery");
        return Ok(());
    }

    loop {
        let value = select! {
            recv(stop_rx) -> _ => {
                debug!("consumer cancelled");
                return Ok(());
            }
            recv(deliveries) -> msg => match msg {
                Ok(Delivery::Value(value)) => value,
                Ok(Delivery::Closed) | Err(_) => {
                    info!("channel closed; consumer exiting");
                    return Ok(());
                }
            },
        };

        counters.tick();
        if let Err(source) = consume(value) {
            counters.fail();
            match policy {
                FailurePolicy::Skip => warn!(error = %source, "consume failed; skipping value"),
                FailurePolicy::Stop => {
                    error!(error = %source, "consume failed; stopping consumer");
                    channel.close();
                    return Err(DriverError::Consume(source));
                }
            }
        }

        select! {
            recv(stop_rx) -> _ => {
                debug!("consumer cancelled during delay");
                return Ok(());
            }
            recv(crossbeam_channel::after(period)) -> _ => {}
        }

        if !request(channel, stop_rx)? {
            info!("consumer exiting");
            return Ok(());
        }
    }
}
