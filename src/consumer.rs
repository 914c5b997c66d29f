use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::record::Event;

/// A member of a consumer group.
///
/// The assignment is replaced wholesale by every rebalance of the owning
/// group. The consumed log only ever grows.
#[derive(Debug)]
pub struct Consumer {
    id: String,
    pub(crate) assignment: RwLock<Vec<Arc<Partition>>>,
    log: Mutex<Vec<Event>>,
}

impl Consumer {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assignment: RwLock::new(vec![]),
            log: Mutex::new(vec![]),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ids of the currently assigned partitions, in assignment order.
    pub fn assigned_partitions(&self) -> Vec<String> {
        self.assignment
            .read()
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    pub fn is_assigned(&self, partition_id: &str) -> bool {
        self.assignment.read().iter().any(|p| p.id() == partition_id)
    }

    /// Snapshot of every event this consumer has consumed, oldest first.
    pub fn consumed(&self) -> Vec<Event> {
        self.log.lock().clone()
    }

    pub fn consumed_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Pops `count` events off `partition` into the consumed log.
    ///
    /// The assignment stays read-locked for the whole pop so a concurrent
    /// rebalance cannot swap it halfway through.
    pub(crate) fn consume(&self, partition: &Partition, count: usize) -> Result<Vec<Event>> {
        let assignment = self.assignment.read();
        if !assignment.iter().any(|p| p.id() == partition.id()) {
            return Err(Error::NotAssigned {
                consumer: self.id.clone(),
                partition: partition.id().to_string(),
            });
        }

        let events = partition.drain_into(count, |events| {
            self.log.lock().extend_from_slice(events);
        })?;
        drop(assignment);

        debug!(
            consumer = self.id.as_str(),
            partition = partition.id(),
            count = events.len(),
            "consumed events",
        );

        Ok(events)
    }
}
