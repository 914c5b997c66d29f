//! An in-memory, partitioned publish/subscribe broker.
//!
//! Producers append events to the partitions of a topic, picking the partition
//! with an [`Allocation`] strategy. Consumer groups split a topic's partitions
//! among their members with a [`Rebalance`] strategy, recomputed every time a
//! member joins or leaves. Consumers pop events from their assigned partitions
//! in FIFO order.
//!
//! ```
//! use tributary::{Allocation, BrokerBuilder, MemoryPayloads, Rebalance, ValueType};
//!
//! let payloads = MemoryPayloads::new().with("greeting", "hello");
//! let broker = BrokerBuilder::new(payloads).build();
//!
//! broker.create_topic("events", ValueType::Text).unwrap();
//! broker.create_partition("events", "p0").unwrap();
//! broker.create_consumer_group("readers", "events", Rebalance::Range).unwrap();
//! broker.create_consumer("readers", "alice").unwrap();
//! broker.create_producer("writer", ValueType::Text, Allocation::Random).unwrap();
//!
//! broker.produce("writer", "events", "greeting", None).unwrap();
//! let events = broker.consume("alice", "p0", 1).unwrap();
//! assert_eq!(events[0].value().to_string(), "hello");
//! ```
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod broker;
pub mod command;
pub mod consumer;
pub mod consumer_group;
pub mod error;
pub mod partition;
pub mod payload;
pub mod producer;
pub mod record;
pub mod topic;

pub use broker::batch::{BatchReport, ConsumeRequest, ProduceRequest};
pub use broker::{Broker, BrokerBuilder, Produced};
pub use consumer::Consumer;
pub use consumer_group::{ConsumerGroup, GroupDescription, Rebalance};
pub use error::{Entity, Error, Result};
pub use partition::Partition;
pub use payload::{DirectoryPayloads, MemoryPayloads, PayloadError, PayloadStore};
pub use producer::{Allocation, Producer};
pub use record::{Event, Payload, Record, ValueType};
pub use topic::{Topic, TopicDescription};
