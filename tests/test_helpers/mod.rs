#![allow(dead_code)]

use std::sync::Once;

use tributary::{Allocation, Broker, BrokerBuilder, MemoryPayloads, Rebalance, ValueType};

/// Enables tracing output when `RUST_LOG` is set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Installs a global subscriber exactly once per test binary.
pub fn start_logging() {
    static START_LOGGING: Once = Once::new();

    START_LOGGING.call_once(|| {
        // Also routes `log` records through the subscriber.
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .expect("subscriber");
    })
}

/// Text payloads `e0..e{n}` holding `value-{i}`, plus numbers `n0..n{n}`.
pub fn payloads(n: usize) -> MemoryPayloads {
    let payloads = MemoryPayloads::new();
    for i in 0..n {
        payloads.insert(format!("e{i}"), format!("value-{i}"));
        payloads.insert(format!("n{i}"), i as i64);
    }
    payloads
}

pub fn broker() -> Broker {
    BrokerBuilder::new(payloads(32)).build()
}

/// A text topic `topic` with partitions `p0..p{partitions}` and a group `group`.
pub fn topic_with_group(
    broker: &Broker,
    topic: &str,
    partitions: usize,
    group: &str,
    strategy: Rebalance,
) {
    broker.create_topic(topic, ValueType::Text).unwrap();
    for i in 0..partitions {
        broker.create_partition(topic, &format!("p{i}")).unwrap();
    }
    broker
        .create_consumer_group(group, topic, strategy)
        .unwrap();
}

pub fn text_producer(broker: &Broker, producer: &str, allocation: Allocation) {
    broker
        .create_producer(producer, ValueType::Text, allocation)
        .unwrap();
}
