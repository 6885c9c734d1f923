mod channel;
mod config;
mod error;
mod sink;

pub use channel::{BoundedChannel, ChannelStats, Requested};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use sink::Sink;
