use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::payload::PayloadError;
use crate::record::ValueType;

/// The kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Topic,
    Partition,
    ConsumerGroup,
    Consumer,
    Producer,
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Topic => "topic",
            Self::Partition => "partition",
            Self::ConsumerGroup => "consumer group",
            Self::Consumer => "consumer",
            Self::Producer => "producer",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: Entity, id: String },

    #[error("{kind} '{id}' already exists")]
    Duplicate { kind: Entity, id: String },

    #[error("Partition '{partition}' has {available} pending event(s), wanted {wanted}")]
    EmptyQueue {
        partition: String,
        available: usize,
        wanted: usize,
    },

    #[error("Index {index} is out of range for {len} partition(s)")]
    InvalidIndex { index: i64, len: usize },

    #[error("Cannot load payload: {0}")]
    PayloadLoad(#[from] PayloadError),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: ValueType, got: ValueType },

    #[error("Consumer '{consumer}' is not assigned partition '{partition}'")]
    NotAssigned { consumer: String, partition: String },

    #[error("Batch task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn not_found(kind: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn duplicate(kind: Entity, id: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
