//! Behavioural tests for the bounded channel: capacity, ordering, pending
//! requests, attachment and close.

use sluice_channel::{BoundedChannel, ChannelConfig, ChannelError, Requested, Sink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every delivery and every end-of-stream signal.
#[derive(Clone, Default)]
struct Recorder {
    got: Arc<Mutex<Vec<&'static str>>>,
    closed: Arc<AtomicUsize>,
}

impl Recorder {
    fn values(&self) -> Vec<&'static str> {
        self.got.lock().unwrap().clone()
    }

    fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Sink<&'static str> for Recorder {
    fn deliver(&self, value: &'static str) {
        self.got.lock().unwrap().push(value);
    }

    fn closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn channel_with(capacity: usize) -> (BoundedChannel<&'static str>, Recorder) {
    let ch = BoundedChannel::new(ChannelConfig::new(capacity));
    let rec = Recorder::default();
    ch.attach(rec.clone()).unwrap();
    (ch, rec)
}

#[test]
fn capacity_is_never_exceeded_and_oldest_goes_first() {
    let (ch, rec) = channel_with(3);
    let values = ["a", "b", "c", "d", "e", "f", "g"];
    for v in values {
        ch.produce(v).unwrap();
        assert!(ch.len() <= 3);
    }
    assert_eq!(ch.snapshot(), ["e", "f", "g"]);
    assert_eq!(ch.stats().evicted, 4);
    assert!(rec.values().is_empty());
}

#[test]
fn buffered_values_come_out_in_production_order() {
    let (ch, rec) = channel_with(8);
    for v in ["one", "two", "three"] {
        ch.produce(v).unwrap();
    }
    for _ in 0..3 {
        assert_eq!(ch.request_next(), Ok(Requested::Delivered));
    }
    assert_eq!(rec.values(), ["one", "two", "three"]);
    assert!(ch.is_empty());
}

#[test]
fn pending_request_is_resolved_by_next_produce() {
    let (ch, rec) = channel_with(4);
    assert_eq!(ch.request_next(), Ok(Requested::Pending));
    assert!(ch.is_pending());
    assert!(rec.values().is_empty());

    ch.produce("x").unwrap();
    assert_eq!(rec.values(), ["x"]);
    assert!(!ch.is_pending());
    assert!(ch.is_empty());

    // The following value is buffered, not delivered: no request is outstanding.
    ch.produce("y").unwrap();
    assert_eq!(rec.values(), ["x"]);
    assert_eq!(ch.snapshot(), ["y"]);
}

#[test]
fn capacity_two_walkthrough() {
    let (ch, rec) = channel_with(2);
    ch.produce("A").unwrap();
    ch.produce("B").unwrap();
    ch.produce("C").unwrap();
    assert_eq!(ch.snapshot(), ["B", "C"]);

    assert_eq!(ch.request_next(), Ok(Requested::Delivered));
    assert_eq!(rec.values(), ["B"]);
    assert_eq!(ch.snapshot(), ["C"]);

    assert_eq!(ch.request_next(), Ok(Requested::Delivered));
    assert_eq!(rec.values(), ["B", "C"]);
    assert!(ch.is_empty());
    assert!(!ch.is_pending());

    assert_eq!(ch.request_next(), Ok(Requested::Pending));
    assert!(ch.is_pending());
    assert_eq!(rec.values(), ["B", "C"]);

    ch.produce("D").unwrap();
    assert_eq!(rec.values(), ["B", "C", "D"]);

    let stats = ch.stats();
    assert_eq!(stats.produced, 4);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.buffered, 0);
}

#[test]
fn second_request_while_pending_is_a_protocol_violation() {
    let (ch, rec) = channel_with(2);
    assert_eq!(ch.request_next(), Ok(Requested::Pending));
    assert_eq!(ch.request_next(), Err(ChannelError::ProtocolViolation));

    // The original request is still intact and exactly one delivery follows.
    ch.produce("only").unwrap();
    ch.produce("buffered").unwrap();
    assert_eq!(rec.values(), ["only"]);
    assert_eq!(ch.snapshot(), ["buffered"]);
}

#[test]
fn request_without_consumer_is_rejected() {
    let ch: BoundedChannel<&'static str> = BoundedChannel::new(ChannelConfig::new(2));
    ch.produce("kept").unwrap();
    assert_eq!(ch.request_next(), Err(ChannelError::Detached));
    assert_eq!(ch.snapshot(), ["kept"]);
}

#[test]
fn only_one_consumer_may_attach() {
    let (ch, _rec) = channel_with(2);
    assert_eq!(ch.attach(Recorder::default()), Err(ChannelError::AlreadyAttached));
}

#[test]
fn detach_withdraws_pending_request_and_allows_reattach() {
    let (ch, first) = channel_with(2);
    assert_eq!(ch.request_next(), Ok(Requested::Pending));
    assert!(ch.detach());
    assert!(!ch.is_pending());
    assert!(!ch.is_attached());

    ch.produce("later").unwrap();
    assert!(first.values().is_empty());
    assert_eq!(ch.snapshot(), ["later"]);

    let second = Recorder::default();
    ch.attach(second.clone()).unwrap();
    assert_eq!(ch.request_next(), Ok(Requested::Delivered));
    assert_eq!(second.values(), ["later"]);
    assert!(first.values().is_empty());
}

#[test]
fn closed_channel_rejects_everything_without_hanging() {
    let (ch, rec) = channel_with(2);
    ch.produce("dropped").unwrap();
    assert!(ch.close());

    assert_eq!(ch.request_next(), Err(ChannelError::Closed));
    assert_eq!(ch.produce("late"), Err(ChannelError::Closed));
    assert_eq!(ch.attach(Recorder::default()), Err(ChannelError::Closed));
    assert!(ch.is_empty());
    assert!(rec.values().is_empty());
    assert_eq!(rec.closed_count(), 1);
}

#[test]
fn close_clears_pending_and_signals_once() {
    let (ch, rec) = channel_with(2);
    assert_eq!(ch.request_next(), Ok(Requested::Pending));
    assert!(ch.close());
    assert!(!ch.close());

    let stats = ch.stats();
    assert!(stats.closed);
    assert!(!stats.pending);
    assert_eq!(rec.closed_count(), 1);
}

#[test]
fn closures_are_sinks() {
    let ch = BoundedChannel::new(ChannelConfig::new(1));
    let total = Arc::new(AtomicUsize::new(0));
    let t = total.clone();
    ch.attach(move |v: usize| {
        t.fetch_add(v, Ordering::SeqCst);
    })
    .unwrap();

    ch.produce(40).unwrap();
    ch.produce(2).unwrap(); // evicts 40
    ch.request_next().unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 2);
}

/// A sink that re-requests from inside its own delivery must not deadlock:
/// the channel invokes sinks with its lock released.
#[test]
fn reentrant_sink_drains_buffer() {
    struct Greedy {
        ch: Arc<BoundedChannel<u32>>,
        got: Arc<Mutex<Vec<u32>>>,
    }

    impl Sink<u32> for Greedy {
        fn deliver(&self, value: u32) {
            self.got.lock().unwrap().push(value);
            let _ = self.ch.request_next();
        }
    }

    let ch = Arc::new(BoundedChannel::new(ChannelConfig::new(4)));
    let got = Arc::new(Mutex::new(Vec::new()));
    for v in 1..=4 {
        ch.produce(v).unwrap();
    }
    ch.attach(Greedy {
        ch: ch.clone(),
        got: got.clone(),
    })
    .unwrap();

    assert_eq!(ch.request_next(), Ok(Requested::Delivered));
    assert_eq!(*got.lock().unwrap(), [1, 2, 3, 4]);
    // The last nested request found nothing and is now pending.
    assert!(ch.is_pending());

    ch.produce(5).unwrap();
    assert_eq!(*got.lock().unwrap(), [1, 2, 3, 4, 5]);
    assert!(ch.is_pending());

    // Break the Arc cycle between the channel and its sink.
    ch.close();
}

#[test]
fn requeued_values_return_to_the_front_uncounted() {
    let (ch, rec) = channel_with(4);
    for v in ["a", "b", "c"] {
        ch.produce(v).unwrap();
    }
    ch.request_next().unwrap();
    ch.request_next().unwrap();
    assert_eq!(rec.values(), ["a", "b"]);
    assert_eq!(ch.stats().delivered, 2);

    // The consumer was handed "a" and "b" but processed neither.
    ch.requeue_front(vec!["a", "b"]).unwrap();
    assert_eq!(ch.snapshot(), ["a", "b", "c"]);

    let stats = ch.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.produced, stats.delivered + stats.evicted + stats.buffered as u64);
}

#[test]
fn requeue_into_a_full_buffer_evicts_the_requeued_value() {
    let (ch, rec) = channel_with(2);
    ch.produce("a").unwrap();
    ch.request_next().unwrap();
    assert_eq!(rec.values(), ["a"]);
    ch.produce("b").unwrap();
    ch.produce("c").unwrap();

    ch.requeue_front(vec!["a"]).unwrap();
    assert_eq!(ch.snapshot(), ["b", "c"]);

    let stats = ch.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.produced, stats.delivered + stats.evicted + stats.buffered as u64);
}

#[test]
fn requeue_satisfies_a_new_consumers_pending_request() {
    let ch: BoundedChannel<&'static str> = BoundedChannel::new(ChannelConfig::new(2));
    let old = Recorder::default();
    ch.attach(old.clone()).unwrap();
    ch.produce("x").unwrap();
    ch.request_next().unwrap();
    assert!(ch.detach());

    let new = Recorder::default();
    ch.attach(new.clone()).unwrap();
    assert_eq!(ch.request_next(), Ok(Requested::Pending));

    ch.requeue_front(vec!["x"]).unwrap();
    assert_eq!(new.values(), ["x"]);
    assert!(!ch.is_pending());
    assert_eq!(ch.stats().delivered, 1);
}

#[test]
fn requeue_after_close_is_rejected() {
    let (ch, _rec) = channel_with(2);
    ch.close();
    assert_eq!(ch.requeue_front(vec!["late"]), Err(ChannelError::Closed));
}
