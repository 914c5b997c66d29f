use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::{Event, Record};

#[derive(Debug, Default)]
struct Queue {
    events: VecDeque<Event>,
    next_offset: u64,
}

/// An ordered FIFO queue of events inside a topic.
///
/// Appends and pops on the same partition are serialized; different partitions
/// never contend with each other.
#[derive(Debug)]
pub struct Partition {
    id: String,
    queue: Mutex<Queue>,
}

impl Partition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue: Mutex::new(Queue::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stamps `record` with the next offset and pushes it to the tail.
    pub fn append(&self, record: Record) -> u64 {
        let mut queue = self.queue.lock();
        let offset = queue.next_offset;
        queue.next_offset += 1;
        queue.events.push_back(Event { record, offset });

        offset
    }

    /// Removes the head of the queue, never waiting for one to arrive.
    pub fn pop_front(&self) -> Result<Event> {
        self.queue.lock().events.pop_front().ok_or_else(|| Error::EmptyQueue {
            partition: self.id.clone(),
            available: 0,
            wanted: 1,
        })
    }

    /// Pops `count` events, or nothing at all when fewer are queued.
    pub fn pop_front_many(&self, count: usize) -> Result<Vec<Event>> {
        self.drain_into(count, |_| {})
    }

    /// Pops `count` events and hands them to `sink` while the queue is still
    /// locked, so an event is never observable outside both containers.
    pub(crate) fn drain_into<F>(&self, count: usize, sink: F) -> Result<Vec<Event>>
    where
        F: FnOnce(&[Event]),
    {
        let mut queue = self.queue.lock();
        let available = queue.events.len();
        if available < count {
            return Err(Error::EmptyQueue {
                partition: self.id.clone(),
                available,
                wanted: count,
            });
        }

        let events = queue.events.drain(..count).collect::<Vec<_>>();
        sink(&events);

        Ok(events)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the pending events, head first.
    pub fn events(&self) -> Vec<Event> {
        self.queue.lock().events.iter().cloned().collect()
    }
}
