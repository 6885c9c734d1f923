mod config;

pub use config::{ChannelSection, ConfigError, ConsumerSection, ProducerSection, SluiceConfig};
