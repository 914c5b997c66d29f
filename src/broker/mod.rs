use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::consumer::Consumer;
use crate::consumer_group::{ConsumerGroup, GroupDescription, Rebalance};
use crate::error::{Entity, Error, Result};
use crate::partition::Partition;
use crate::payload::PayloadStore;
use crate::producer::{Allocation, Producer};
use crate::record::{Event, ValueType};
use crate::topic::{Topic, TopicDescription};

pub mod batch;

/// Builder for [`Broker`].
pub struct BrokerBuilder {
    payloads: Arc<dyn PayloadStore>,
    max_parallelism: Option<usize>,
}

impl BrokerBuilder {
    /// Create a new [`BrokerBuilder`] resolving event keys through `payloads`.
    pub fn new(payloads: impl PayloadStore + 'static) -> Self {
        Self {
            payloads: Arc::new(payloads),
            max_parallelism: None,
        }
    }

    /// Use an already shared payload store.
    pub fn with_shared_payloads(payloads: Arc<dyn PayloadStore>) -> Self {
        Self {
            payloads,
            max_parallelism: None,
        }
    }

    /// Limit how many requests of a parallel batch run at once.
    ///
    /// Batches are unbounded by default. Zero is treated as one.
    pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = Some(max_parallelism.max(1));
        self
    }

    /// Build [`Broker`].
    pub fn build(self) -> Broker {
        Broker {
            inner: Arc::new(Inner {
                topics: RwLock::new(HashMap::new()),
                producers: RwLock::new(HashMap::new()),
                admin: Mutex::new(()),
                payloads: self.payloads,
                parallelism: self.max_parallelism.map(|n| Arc::new(Semaphore::new(n))),
            }),
        }
    }
}

impl std::fmt::Debug for BrokerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerBuilder")
            .field("max_parallelism", &self.max_parallelism)
            .finish_non_exhaustive()
    }
}

struct Inner {
    /// Topics keyed by topic ID
    topics: RwLock<HashMap<String, Arc<Topic>>>,

    /// Producers keyed by producer ID
    producers: RwLock<HashMap<String, Arc<Producer>>>,

    /// Serializes administrative changes that check ids across topics.
    admin: Mutex<()>,

    payloads: Arc<dyn PayloadStore>,

    /// Bounds batch concurrency when configured.
    parallelism: Option<Arc<Semaphore>>,
}

/// Where a produced event ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produced {
    pub topic: String,
    pub partition: String,
    pub offset: u64,
}

/// Top-level registry of topics and producers.
///
/// Cloning is cheap and every clone drives the same state. Must be constructed
/// using [`BrokerBuilder`].
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.inner.topics.read().len())
            .field("producers", &self.inner.producers.read().len())
            .finish_non_exhaustive()
    }
}

impl Broker {
    pub fn create_topic(&self, topic_id: &str, value_type: ValueType) -> Result<Arc<Topic>> {
        let mut topics = self.inner.topics.write();
        match topics.entry(topic_id.to_string()) {
            Entry::Occupied(_) => Err(Error::duplicate(Entity::Topic, topic_id)),
            Entry::Vacant(v) => {
                let topic = Arc::new(Topic::new(topic_id, value_type));
                v.insert(Arc::clone(&topic));
                info!(topic = topic_id, %value_type, "topic created");

                Ok(topic)
            }
        }
    }

    pub fn create_partition(&self, topic_id: &str, partition_id: &str) -> Result<Arc<Partition>> {
        self.topic(topic_id)?.add_partition(partition_id)
    }

    /// Group ids are unique across the broker so `create consumer` and
    /// `show consumer group` can resolve them without a topic.
    pub fn create_consumer_group(
        &self,
        group_id: &str,
        topic_id: &str,
        strategy: Rebalance,
    ) -> Result<Arc<ConsumerGroup>> {
        let _admin = self.inner.admin.lock();
        let topic = self.topic(topic_id)?;
        if self.find_topic(|t| t.contains_group(group_id)).is_some() {
            return Err(Error::duplicate(Entity::ConsumerGroup, group_id));
        }

        topic.add_consumer_group(group_id, strategy)
    }

    /// Consumer ids are unique across the broker so `delete` and `consume`
    /// resolve exactly one consumer.
    pub fn create_consumer(&self, group_id: &str, consumer_id: &str) -> Result<Arc<Consumer>> {
        let _admin = self.inner.admin.lock();
        let topic = self.topic_with_group(group_id)?;
        if self.find_topic(|t| t.contains_consumer(consumer_id)).is_some() {
            return Err(Error::duplicate(Entity::Consumer, consumer_id));
        }

        topic.add_consumer(group_id, consumer_id)
    }

    pub fn create_producer(
        &self,
        producer_id: &str,
        value_type: ValueType,
        allocation: Allocation,
    ) -> Result<Arc<Producer>> {
        let mut producers = self.inner.producers.write();
        match producers.entry(producer_id.to_string()) {
            Entry::Occupied(_) => Err(Error::duplicate(Entity::Producer, producer_id)),
            Entry::Vacant(v) => {
                let producer = Arc::new(Producer::new(producer_id, value_type, allocation));
                v.insert(Arc::clone(&producer));
                info!(
                    producer = producer_id,
                    %value_type,
                    %allocation,
                    "producer created",
                );

                Ok(producer)
            }
        }
    }

    /// Removes a consumer and returns its group as it looks afterwards.
    pub fn delete_consumer(&self, consumer_id: &str) -> Result<GroupDescription> {
        let _admin = self.inner.admin.lock();
        let topic = self.topic_with_consumer(consumer_id)?;
        let group = topic.remove_consumer(consumer_id)?;

        Ok(group.describe())
    }

    /// Produces `event_key` to `partition_id`, or wherever the producer's
    /// allocation strategy picks when no partition is named.
    pub fn produce(
        &self,
        producer_id: &str,
        topic_id: &str,
        event_key: &str,
        partition_id: Option<&str>,
    ) -> Result<Produced> {
        self.produce_inner(producer_id, topic_id, event_key, partition_id, None)
    }

    /// Produces `event_key` with an explicit allocation key, used as the
    /// partition index by [`Allocation::Manual`] producers.
    pub fn produce_keyed(
        &self,
        producer_id: &str,
        topic_id: &str,
        event_key: &str,
        key: i64,
    ) -> Result<Produced> {
        self.produce_inner(producer_id, topic_id, event_key, None, Some(key))
    }

    fn produce_inner(
        &self,
        producer_id: &str,
        topic_id: &str,
        event_key: &str,
        partition_id: Option<&str>,
        key: Option<i64>,
    ) -> Result<Produced> {
        let producer = self.producer(producer_id)?;
        let topic = self.topic(topic_id)?;
        if producer.value_type() != topic.value_type() {
            return Err(Error::TypeMismatch {
                expected: topic.value_type(),
                got: producer.value_type(),
            });
        }

        let partition = match partition_id {
            Some(id) => topic.partition(id)?,
            None => {
                let index = producer
                    .allocation()
                    .allocate(key, topic.partition_count())?;
                topic.partition_at(index)?
            }
        };

        let payload = self.inner.payloads.fetch(event_key)?;
        let record = producer.record(event_key, payload)?;
        let offset = topic.produce_to(record, partition.id())?;
        debug!(
            producer = producer_id,
            topic = topic_id,
            partition = partition.id(),
            event = event_key,
            offset,
            "produced",
        );

        Ok(Produced {
            topic: topic_id.to_string(),
            partition: partition.id().to_string(),
            offset,
        })
    }

    /// Pops `count` events from `partition_id` into the consumer's log.
    ///
    /// Either all `count` events are consumed or none are.
    pub fn consume(
        &self,
        consumer_id: &str,
        partition_id: &str,
        count: usize,
    ) -> Result<Vec<Event>> {
        let topic = self.topic_with_consumer(consumer_id)?;
        topic.consume_from(consumer_id, partition_id, count)
    }

    pub fn show_topic(&self, topic_id: &str) -> Result<TopicDescription> {
        Ok(self.topic(topic_id)?.describe())
    }

    pub fn show_consumer_group(&self, group_id: &str) -> Result<GroupDescription> {
        Ok(self.consumer_group(group_id)?.describe())
    }

    /// Swaps the group's strategy without rebalancing.
    pub fn set_consumer_group_rebalancing(
        &self,
        group_id: &str,
        strategy: Rebalance,
    ) -> Result<()> {
        self.consumer_group(group_id)?.set_strategy(strategy);
        Ok(())
    }

    pub fn rebalance_consumer_group(&self, group_id: &str) -> Result<()> {
        let _admin = self.inner.admin.lock();
        self.topic_with_group(group_id)?.rebalance(group_id)
    }

    /// Replay from an offset is not supported; ids are still validated.
    pub fn playback(&self, consumer_id: &str, partition_id: &str, offset: u64) -> Result<()> {
        let topic = self.topic_with_consumer(consumer_id)?;
        topic.partition(partition_id)?;
        warn!(
            consumer = consumer_id,
            partition = partition_id,
            offset,
            "playback is not supported, nothing replayed",
        );

        Ok(())
    }

    pub fn topic(&self, topic_id: &str) -> Result<Arc<Topic>> {
        self.inner
            .topics
            .read()
            .get(topic_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Topic, topic_id))
    }

    /// All topics, sorted by id.
    pub fn topics(&self) -> Vec<Arc<Topic>> {
        let mut topics = self.inner.topics.read().values().cloned().collect::<Vec<_>>();
        topics.sort_by(|a, b| a.id().cmp(b.id()));
        topics
    }

    pub fn producer(&self, producer_id: &str) -> Result<Arc<Producer>> {
        self.inner
            .producers
            .read()
            .get(producer_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Producer, producer_id))
    }

    pub fn consumer_group(&self, group_id: &str) -> Result<Arc<ConsumerGroup>> {
        self.topic_with_group(group_id)?.consumer_group(group_id)
    }

    pub fn consumer(&self, consumer_id: &str) -> Result<Arc<Consumer>> {
        self.topic_with_consumer(consumer_id)?.consumer(consumer_id)
    }

    fn topic_with_group(&self, group_id: &str) -> Result<Arc<Topic>> {
        self.find_topic(|t| t.contains_group(group_id))
            .ok_or_else(|| Error::not_found(Entity::ConsumerGroup, group_id))
    }

    fn topic_with_consumer(&self, consumer_id: &str) -> Result<Arc<Topic>> {
        self.find_topic(|t| t.contains_consumer(consumer_id))
            .ok_or_else(|| Error::not_found(Entity::Consumer, consumer_id))
    }

    /// Group and consumer ids are unique across topics, so at most one matches.
    fn find_topic(&self, predicate: impl Fn(&Topic) -> bool) -> Option<Arc<Topic>> {
        self.inner
            .topics
            .read()
            .values()
            .find(|t| predicate(t))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::payload::MemoryPayloads;

    fn broker() -> Broker {
        let payloads = MemoryPayloads::new()
            .with("hello", "world")
            .with("answer", 42i64);
        BrokerBuilder::new(payloads).build()
    }

    #[test]
    fn ids_are_unique() {
        let broker = broker();
        broker.create_topic("t1", ValueType::Text).unwrap();
        broker.create_topic("t2", ValueType::Text).unwrap();
        assert_matches!(
            broker.create_topic("t1", ValueType::Number),
            Err(Error::Duplicate {
                kind: Entity::Topic,
                ..
            })
        );

        broker
            .create_producer("p1", ValueType::Text, Allocation::Random)
            .unwrap();
        assert_matches!(
            broker.create_producer("p1", ValueType::Text, Allocation::Manual),
            Err(Error::Duplicate {
                kind: Entity::Producer,
                ..
            })
        );

        broker
            .create_consumer_group("g1", "t1", Rebalance::Range)
            .unwrap();
        assert_matches!(
            broker.create_consumer_group("g1", "t2", Rebalance::Range),
            Err(Error::Duplicate {
                kind: Entity::ConsumerGroup,
                ..
            })
        );

        broker
            .create_consumer_group("g2", "t2", Rebalance::Range)
            .unwrap();
        broker.create_consumer("g1", "c1").unwrap();
        assert_matches!(
            broker.create_consumer("g2", "c1"),
            Err(Error::Duplicate {
                kind: Entity::Consumer,
                ..
            })
        );
    }

    #[test]
    fn lookups_resolve_across_topics() {
        let broker = broker();
        for (topic, group, consumer) in [("zeta", "gz", "cz"), ("alpha", "ga", "ca")] {
            broker.create_topic(topic, ValueType::Text).unwrap();
            broker.create_partition(topic, "p0").unwrap();
            broker
                .create_consumer_group(group, topic, Rebalance::Range)
                .unwrap();
            broker.create_consumer(group, consumer).unwrap();
        }

        assert_eq!(broker.consumer_group("gz").unwrap().topic(), "zeta");
        assert_eq!(broker.consumer_group("ga").unwrap().topic(), "alpha");
        assert_eq!(broker.consumer("cz").unwrap().assigned_partitions(), vec!["p0"]);
        assert_eq!(broker.show_consumer_group("ga").unwrap().members[0].id, "ca");
        assert_eq!(broker.delete_consumer("cz").unwrap().topic, "zeta");
        assert_eq!(
            broker.topics().iter().map(|t| t.id()).collect::<Vec<_>>(),
            vec!["alpha", "zeta"]
        );
    }

    #[test]
    fn lookups_fail_with_not_found() {
        let broker = broker();
        assert_matches!(
            broker.create_partition("t9", "p0"),
            Err(Error::NotFound {
                kind: Entity::Topic,
                ..
            })
        );
        assert_matches!(
            broker.create_consumer("g9", "c1"),
            Err(Error::NotFound {
                kind: Entity::ConsumerGroup,
                ..
            })
        );
        assert_matches!(
            broker.delete_consumer("c9"),
            Err(Error::NotFound {
                kind: Entity::Consumer,
                ..
            })
        );
        assert_matches!(
            broker.produce("p9", "t9", "hello", None),
            Err(Error::NotFound {
                kind: Entity::Producer,
                ..
            })
        );
        assert_matches!(
            broker.show_consumer_group("g9"),
            Err(Error::NotFound { .. })
        );
    }

    #[test]
    fn produce_checks_types() {
        let broker = broker();
        broker.create_topic("t1", ValueType::Text).unwrap();
        broker.create_partition("t1", "p0").unwrap();
        broker
            .create_producer("numbers", ValueType::Number, Allocation::Random)
            .unwrap();
        broker
            .create_producer("text", ValueType::Text, Allocation::Random)
            .unwrap();

        assert_matches!(
            broker.produce("numbers", "t1", "answer", None),
            Err(Error::TypeMismatch { .. })
        );
        assert_matches!(
            broker.produce("text", "t1", "answer", None),
            Err(Error::TypeMismatch { .. })
        );
        assert_matches!(
            broker.produce("text", "t1", "missing", None),
            Err(Error::PayloadLoad(_))
        );

        let produced = broker.produce("text", "t1", "hello", None).unwrap();
        assert_eq!(produced.partition, "p0");
        assert_eq!(produced.offset, 0);
    }

    #[test]
    fn playback_is_a_no_op() {
        let broker = broker();
        broker.create_topic("t1", ValueType::Text).unwrap();
        broker.create_partition("t1", "p0").unwrap();
        broker
            .create_consumer_group("g1", "t1", Rebalance::Range)
            .unwrap();
        broker.create_consumer("g1", "c1").unwrap();

        broker.playback("c1", "p0", 0).unwrap();
        assert_matches!(broker.playback("c1", "p9", 0), Err(Error::NotFound { .. }));
    }
}
