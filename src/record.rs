use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Two-way type tag carried by topics, producers and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Number,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Number => f.write_str("number"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown value type '{0}', expected text or number")]
pub struct UnknownValueType(pub String);

impl FromStr for ValueType {
    type Err = UnknownValueType;

    /// Accepts `text`/`number` in any case, plus the `String`/`Integer`
    /// spelling used by older command scripts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(Self::Text),
            "number" | "integer" | "int" => Ok(Self::Number),
            _ => Err(UnknownValueType(s.to_string())),
        }
    }
}

/// The typed value of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Number(i64),
}

impl Payload {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::Text,
            Self::Number(_) => ValueType::Number,
        }
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// An event on its way into a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key the payload was fetched by; becomes the event id.
    pub key: String,
    pub payload: Payload,
    /// Id of the producer that created the record.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A [`Record`] stamped with its partition offset.
///
/// Events are never mutated once created. They live in exactly one place at a
/// time: a partition queue until consumed, then the consumer's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub record: Record,
    pub offset: u64,
}

impl Event {
    pub fn id(&self) -> &str {
        &self.record.key
    }

    pub fn payload_type(&self) -> ValueType {
        self.record.payload.value_type()
    }

    pub fn value(&self) -> &Payload {
        &self.record.payload
    }

    pub fn source(&self) -> &str {
        &self.record.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }
}
