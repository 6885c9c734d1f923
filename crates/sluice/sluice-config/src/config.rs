use serde::Deserialize;
use sluice_engine::FailurePolicy;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SluiceConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub producer: ProducerSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProducerSection {
    #[serde(default = "defaults::producer_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ConsumerSection {
    #[serde(default = "defaults::consumer_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn capacity() -> usize {
        16
    }

    pub fn producer_period_ms() -> u64 {
        100
    }

    pub fn consumer_period_ms() -> u64 {
        250
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            capacity: defaults::capacity(),
        }
    }
}

impl Default for ProducerSection {
    fn default() -> Self {
        Self {
            period_ms: defaults::producer_period_ms(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            period_ms: defaults::consumer_period_ms(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl ProducerSection {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl ConsumerSection {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl SluiceConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_to_str)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SluiceConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.capacity == 0 {
            return Err(ConfigError::Invalid("channel.capacity must be > 0"));
        }
        if self.producer.period_ms == 0 {
            return Err(ConfigError::Invalid("producer.period_ms must be > 0"));
        }
        if self.consumer.period_ms == 0 {
            return Err(ConfigError::Invalid("consumer.period_ms must be > 0"));
        }
        Ok(())
    }
}
