use std::fmt::{Display, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::consumer::Consumer;
use crate::consumer_group::{ConsumerGroup, GroupDescription, Rebalance};
use crate::error::{Entity, Error, Result};
use crate::partition::Partition;
use crate::record::{Event, Record, ValueType};

#[derive(Debug)]
pub struct Topic {
    /// The name of this topic.
    id: String,

    /// Type every event in this topic must carry.
    value_type: ValueType,

    /// Partitions in creation order.
    partitions: RwLock<Vec<Arc<Partition>>>,

    groups: RwLock<Vec<Arc<ConsumerGroup>>>,
}

impl Topic {
    pub fn new(id: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id: id.into(),
            value_type,
            partitions: RwLock::new(vec![]),
            groups: RwLock::new(vec![]),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Snapshot of the partitions in creation order.
    pub fn partitions(&self) -> Vec<Arc<Partition>> {
        self.partitions.read().clone()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn partition(&self, partition_id: &str) -> Result<Arc<Partition>> {
        self.partitions
            .read()
            .iter()
            .find(|p| p.id() == partition_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Partition, partition_id))
    }

    pub fn partition_at(&self, index: usize) -> Result<Arc<Partition>> {
        let partitions = self.partitions.read();
        partitions
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex {
                index: index as i64,
                len: partitions.len(),
            })
    }

    pub fn add_partition(&self, partition_id: &str) -> Result<Arc<Partition>> {
        let mut partitions = self.partitions.write();
        if partitions.iter().any(|p| p.id() == partition_id) {
            return Err(Error::duplicate(Entity::Partition, partition_id));
        }

        let partition = Arc::new(Partition::new(partition_id));
        partitions.push(Arc::clone(&partition));
        info!(
            topic = self.id.as_str(),
            partition = partition_id,
            count = partitions.len(),
            "partition created",
        );

        Ok(partition)
    }

    pub fn consumer_groups(&self) -> Vec<Arc<ConsumerGroup>> {
        self.groups.read().clone()
    }

    pub fn consumer_group(&self, group_id: &str) -> Result<Arc<ConsumerGroup>> {
        self.groups
            .read()
            .iter()
            .find(|g| g.id() == group_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::ConsumerGroup, group_id))
    }

    pub fn contains_group(&self, group_id: &str) -> bool {
        self.groups.read().iter().any(|g| g.id() == group_id)
    }

    pub fn add_consumer_group(
        &self,
        group_id: &str,
        strategy: Rebalance,
    ) -> Result<Arc<ConsumerGroup>> {
        let mut groups = self.groups.write();
        if groups.iter().any(|g| g.id() == group_id) {
            return Err(Error::duplicate(Entity::ConsumerGroup, group_id));
        }

        let group = Arc::new(ConsumerGroup::new(group_id, &self.id, strategy));
        groups.push(Arc::clone(&group));
        info!(
            topic = self.id.as_str(),
            group = group_id,
            %strategy,
            "consumer group created",
        );

        Ok(group)
    }

    /// Adds a consumer to `group_id`, rebalancing that group.
    pub fn add_consumer(&self, group_id: &str, consumer_id: &str) -> Result<Arc<Consumer>> {
        let group = self.consumer_group(group_id)?;
        group.add_consumer(consumer_id, &self.partitions())
    }

    /// Removes a consumer from whichever group holds it, rebalancing that group.
    pub fn remove_consumer(&self, consumer_id: &str) -> Result<Arc<ConsumerGroup>> {
        let group = self.group_with_consumer(consumer_id)?;
        group.remove_consumer(consumer_id, &self.partitions())?;

        Ok(group)
    }

    pub fn rebalance(&self, group_id: &str) -> Result<()> {
        self.consumer_group(group_id)?.rebalance(&self.partitions())
    }

    pub fn contains_consumer(&self, consumer_id: &str) -> bool {
        self.groups
            .read()
            .iter()
            .any(|g| g.contains_consumer(consumer_id))
    }

    pub fn group_with_consumer(&self, consumer_id: &str) -> Result<Arc<ConsumerGroup>> {
        self.groups
            .read()
            .iter()
            .find(|g| g.contains_consumer(consumer_id))
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Consumer, consumer_id))
    }

    pub fn consumer(&self, consumer_id: &str) -> Result<Arc<Consumer>> {
        self.groups
            .read()
            .iter()
            .find_map(|g| g.consumer(consumer_id))
            .ok_or_else(|| Error::not_found(Entity::Consumer, consumer_id))
    }

    /// Appends `record` to the partition named `partition_id`.
    pub fn produce_to(&self, record: Record, partition_id: &str) -> Result<u64> {
        let got = record.payload.value_type();
        if got != self.value_type {
            return Err(Error::TypeMismatch {
                expected: self.value_type,
                got,
            });
        }

        let partition = self.partition(partition_id)?;
        let offset = partition.append(record);
        debug!(
            topic = self.id.as_str(),
            partition = partition_id,
            offset,
            "event appended",
        );

        Ok(offset)
    }

    /// Pops `count` events from `partition_id` into the consumer's log.
    pub fn consume_from(
        &self,
        consumer_id: &str,
        partition_id: &str,
        count: usize,
    ) -> Result<Vec<Event>> {
        let consumer = self.consumer(consumer_id)?;
        let partition = self.partition(partition_id)?;

        consumer.consume(&partition, count)
    }

    pub fn describe(&self) -> TopicDescription {
        TopicDescription {
            id: self.id.clone(),
            value_type: self.value_type,
            partitions: self
                .partitions()
                .iter()
                .map(|p| PartitionDescription {
                    id: p.id().to_string(),
                    events: p.events(),
                })
                .collect(),
            groups: self
                .groups
                .read()
                .iter()
                .map(|g| g.describe())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescription {
    pub id: String,
    /// Pending events, head first.
    pub events: Vec<Event>,
}

/// Point-in-time view of a topic, printed by `show topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub id: String,
    pub value_type: ValueType,
    pub partitions: Vec<PartitionDescription>,
    pub groups: Vec<GroupDescription>,
}

impl Display for TopicDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Topic '{}' ({})", self.id, self.value_type)?;
        if self.partitions.is_empty() {
            writeln!(f, "  (no partitions)")?;
        }

        for partition in &self.partitions {
            writeln!(
                f,
                "  partition '{}': {} pending event(s)",
                partition.id,
                partition.events.len()
            )?;
            for event in &partition.events {
                writeln!(
                    f,
                    "    [{}] {} = {} (from {}, {})",
                    event.offset,
                    event.id(),
                    event.value(),
                    event.source(),
                    event.created_at().to_rfc3339()
                )?;
            }
        }

        for group in &self.groups {
            write!(f, "{group}")?;
        }

        Ok(())
    }
}
