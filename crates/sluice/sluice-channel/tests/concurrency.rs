//! Multi-threaded stress test: a free-running producer thread against a
//! consumer thread that pulls one value at a time.
//!
//! ```bash
//! cargo test -p sluice-channel --test concurrency -- --nocapture
//! ```

use sluice_channel::{BoundedChannel, ChannelConfig, Requested, Sink};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

const VALUE_COUNT: u64 = 200_000;

struct Forward(Sender<u64>);

impl Sink<u64> for Forward {
    fn deliver(&self, value: u64) {
        let _ = self.0.send(value);
    }
}

/// Pulls until the last produced value arrives; returns everything received.
fn consume_until_last(ch: &BoundedChannel<u64>, rx: &Receiver<u64>) -> Vec<u64> {
    let mut received = Vec::new();
    loop {
        // Either delivered already (value is in `rx`) or pending (value will be).
        let _: Requested = ch.request_next().expect("request rejected");
        let v = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("pending request was never satisfied");
        received.push(v);
        if v == VALUE_COUNT - 1 {
            return received;
        }
    }
}

fn run(capacity: usize) {
    let ch = Arc::new(BoundedChannel::new(ChannelConfig::new(capacity)));
    let (tx, rx) = mpsc::channel();
    ch.attach(Forward(tx)).unwrap();

    let producer = {
        let ch = ch.clone();
        thread::spawn(move || {
            for v in 0..VALUE_COUNT {
                ch.produce(v).unwrap();
                if v % 1_000 == 0 {
                    thread::yield_now();
                }
            }
        })
    };

    let received = consume_until_last(&ch, &rx);
    producer.join().expect("producer panicked");

    // FIFO with drop-oldest: strictly increasing, hence no duplicates.
    assert!(
        received.windows(2).all(|w| w[0] < w[1]),
        "deliveries out of order or duplicated"
    );
    assert_eq!(rx.try_recv().ok(), None, "delivery without a request");

    let stats = ch.stats();
    assert_eq!(stats.produced, VALUE_COUNT);
    assert_eq!(stats.delivered, received.len() as u64);
    assert_eq!(stats.buffered, 0);
    assert!(!stats.pending);
    // Every value is accounted for exactly once.
    assert_eq!(stats.delivered + stats.evicted, VALUE_COUNT);

    eprintln!(
        "capacity={capacity}: delivered={} evicted={}",
        stats.delivered, stats.evicted
    );
}

#[test]
fn concurrent_produce_and_request_capacity_one() {
    run(1);
}

#[test]
fn concurrent_produce_and_request_capacity_sixteen() {
    run(16);
}

#[test]
fn concurrent_close_wakes_pending_consumer() {
    struct Notify(Sender<Option<u64>>);

    impl Sink<u64> for Notify {
        fn deliver(&self, value: u64) {
            let _ = self.0.send(Some(value));
        }
        fn closed(&self) {
            let _ = self.0.send(None);
        }
    }

    let ch = Arc::new(BoundedChannel::<u64>::new(ChannelConfig::new(4)));
    let (tx, rx) = mpsc::channel();
    ch.attach(Notify(tx)).unwrap();
    assert_eq!(ch.request_next(), Ok(Requested::Pending));

    let closer = {
        let ch = ch.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            ch.close()
        })
    };

    let msg = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("consumer left hanging after close");
    assert_eq!(msg, None);
    assert!(closer.join().unwrap());
    assert!(ch.request_next().is_err());
}
