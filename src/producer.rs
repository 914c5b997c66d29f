use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use crate::error::{Error, Result};
use crate::record::{Payload, Record, ValueType};

pub const ALLOCATION_RANDOM: &str = "Random";
pub const ALLOCATION_MANUAL: &str = "Manual";

/// Picks the partition a produced event lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Allocation {
    /// Uniformly random partition, drawn again for every event.
    #[default]
    Random,
    /// The caller names the partition index.
    Manual,
}

impl Allocation {
    /// Resolves `name`, falling back to [`Allocation::Random`] for unknown names.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(name, "unknown allocation strategy, using Random");
            Self::Random
        })
    }

    /// Returns the target partition index out of `partition_count`.
    ///
    /// A missing `key` means index 0 for [`Allocation::Manual`].
    pub fn allocate(&self, key: Option<i64>, partition_count: usize) -> Result<usize> {
        match self {
            Self::Random => {
                if partition_count == 0 {
                    return Err(Error::InvalidIndex { index: 0, len: 0 });
                }
                Ok(rand::thread_rng().gen_range(0..partition_count))
            }
            Self::Manual => {
                let index = key.unwrap_or_default();
                usize::try_from(index)
                    .ok()
                    .filter(|i| *i < partition_count)
                    .ok_or(Error::InvalidIndex {
                        index,
                        len: partition_count,
                    })
            }
        }
    }
}

impl Display for Allocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random => f.write_str(ALLOCATION_RANDOM),
            Self::Manual => f.write_str(ALLOCATION_MANUAL),
        }
    }
}

impl FromStr for Allocation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(ALLOCATION_RANDOM) {
            Ok(Self::Random)
        } else if s.eq_ignore_ascii_case(ALLOCATION_MANUAL) {
            Ok(Self::Manual)
        } else {
            Err(format!("unknown allocation strategy '{s}'"))
        }
    }
}

#[derive(Debug)]
pub struct Producer {
    id: String,
    value_type: ValueType,
    allocation: Allocation,
}

impl Producer {
    pub fn new(id: impl Into<String>, value_type: ValueType, allocation: Allocation) -> Self {
        Self {
            id: id.into(),
            value_type,
            allocation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    /// Wraps a fetched payload into a record sourced from this producer.
    pub fn record(&self, key: impl Into<String>, payload: Payload) -> Result<Record> {
        let got = payload.value_type();
        if got != self.value_type {
            return Err(Error::TypeMismatch {
                expected: self.value_type,
                got,
            });
        }

        Ok(Record {
            key: key.into(),
            payload,
            source: self.id.clone(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn random_stays_in_range() {
        for _ in 0..200 {
            let index = Allocation::Random.allocate(None, 3).unwrap();
            assert!(index < 3, "{index}");
        }

        assert_matches!(
            Allocation::Random.allocate(None, 0),
            Err(Error::InvalidIndex { len: 0, .. })
        );
    }

    #[test]
    fn random_is_redrawn() {
        let seen = (0..500)
            .map(|_| Allocation::Random.allocate(None, 4).unwrap())
            .collect::<std::collections::BTreeSet<_>>();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn manual_uses_key() {
        assert_eq!(Allocation::Manual.allocate(Some(2), 3).unwrap(), 2);
        assert_eq!(Allocation::Manual.allocate(None, 3).unwrap(), 0);
        assert_matches!(
            Allocation::Manual.allocate(Some(5), 3),
            Err(Error::InvalidIndex { index: 5, len: 3 })
        );
        assert_matches!(
            Allocation::Manual.allocate(Some(-1), 3),
            Err(Error::InvalidIndex { index: -1, len: 3 })
        );
    }

    #[test]
    fn allocation_by_name() {
        assert_eq!(Allocation::from_name("Manual"), Allocation::Manual);
        assert_eq!(Allocation::from_name("random"), Allocation::Random);
        assert_eq!(Allocation::from_name("Sticky"), Allocation::Random);
    }

    #[test]
    fn record_checks_type() {
        let producer = Producer::new("p1", ValueType::Number, Allocation::Random);

        let record = producer.record("k", Payload::Number(1)).unwrap();
        assert_eq!(record.source, "p1");
        assert_eq!(record.key, "k");

        assert_matches!(
            producer.record("k", Payload::from("text")),
            Err(Error::TypeMismatch {
                expected: ValueType::Number,
                got: ValueType::Text
            })
        );
    }
}
