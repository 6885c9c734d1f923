use anyhow::Context;
use sluice_channel::{BoundedChannel, ChannelConfig};
use sluice_config::SluiceConfig;
use sluice_engine::{ConsumerDriver, ProducerDriver};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_RUN_SECS: u64 = 10;

/// One synthetic sample emitted per producer tick.
#[derive(Debug, Clone, Copy)]
struct Reading {
    seq: u64,
    ts_ns: u64,
    value: i64,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_nanos() as u64)
        .unwrap_or_default()
}

/// Usage: `sluice [config.toml] [run_secs]`
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SluiceConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => SluiceConfig::from_toml_str("")?,
    };
    let run_for = match args.next() {
        Some(secs) => Duration::from_secs(secs.parse().context("run_secs must be an integer")?),
        None => Duration::from_secs(DEFAULT_RUN_SECS),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        capacity = config.channel.capacity,
        producer_ms = config.producer.period_ms,
        consumer_ms = config.consumer.period_ms,
        run_secs = run_for.as_secs(),
        "SLUICE: starting"
    );

    let channel = Arc::new(BoundedChannel::new(ChannelConfig::new(config.channel.capacity)));

    let mut seq = 0u64;
    let mut value = 100_000i64;
    let producer = ProducerDriver::spawn(
        channel.clone(),
        config.producer.period(),
        config.producer.on_failure,
        move || {
            seq += 1;
            value += 1;
            Ok(Reading {
                seq,
                ts_ns: now_ns(),
                value,
            })
        },
    )?;

    let consumer = ConsumerDriver::spawn(
        channel.clone(),
        config.consumer.period(),
        config.consumer.on_failure,
        |reading: Reading| {
            let age_us = now_ns().saturating_sub(reading.ts_ns) / 1_000;
            info!(seq = reading.seq, value = reading.value, age_us, "consumed");
            Ok(())
        },
    )?;

    let started = Instant::now();
    while started.elapsed() < run_for && !producer.is_finished() && !consumer.is_finished() {
        std::thread::sleep(Duration::from_millis(50));
    }

    let produced = producer.stop().context("producer failed")?;
    let consumed = consumer.stop().context("consumer failed")?;
    let stats = channel.stats();

    info!(
        produced = stats.produced,
        delivered = stats.delivered,
        evicted = stats.evicted,
        producer_failures = produced.failures,
        consumer_failures = consumed.failures,
        "SLUICE: done"
    );
    Ok(())
}
