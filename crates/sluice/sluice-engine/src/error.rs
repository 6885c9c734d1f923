use serde::Deserialize;
use sluice_channel::ChannelError;

/// Error type user callbacks report failures with.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// What a driver does when its user callback returns an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report the error, halt the driver and close the channel.
    #[default]
    Stop,
    /// Log the error and carry on with the next tick.
    Skip,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("produce callback failed")]
    Produce(#[source] CallbackError),

    #[error("consume callback failed")]
    Consume(#[source] CallbackError),

    #[error("channel rejected the driver")]
    Channel(#[from] ChannelError),

    #[error("driver period must be non-zero")]
    ZeroPeriod,

    #[error("failed to spawn {name} worker thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} worker thread panicked")]
    Panicked(&'static str),
}
