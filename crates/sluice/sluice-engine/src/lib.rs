//! Timer-driven producer and consumer drivers around a
//! [`BoundedChannel`](sluice_channel::BoundedChannel).
//!
//! Each driver owns one worker thread. The producer produces on a fixed
//! period; the consumer processes one value, waits its own period, then asks
//! for the next. Stopping either driver cancels its timer, joins its worker
//! and closes the channel, which in turn ends the other driver's worker.

mod consumer;
mod error;
mod producer;
mod worker;

pub use consumer::ConsumerDriver;
pub use error::{CallbackError, DriverError, FailurePolicy};
pub use producer::ProducerDriver;
pub use worker::DriverStats;
