//! Lookup of event payloads by key.
//!
//! The broker never stores payloads on its own; when a producer is asked to
//! produce an event it resolves the event key through a [`PayloadStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::record::Payload;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PayloadError {
    #[error("No payload stored under key '{0}'")]
    UnknownKey(String),

    #[error("Cannot read payload '{key}': {source}")]
    IO {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed payload '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Payload '{key}' has no usable value: {reason}")]
    Untyped { key: String, reason: String },
}

pub trait PayloadStore: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Payload, PayloadError>;
}

/// Payloads kept in memory, mostly useful for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryPayloads {
    values: RwLock<HashMap<String, Payload>>,
}

impl MemoryPayloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, payload: impl Into<Payload>) {
        self.values.write().insert(key.into(), payload.into());
    }

    pub fn with(self, key: impl Into<String>, payload: impl Into<Payload>) -> Self {
        self.insert(key, payload);
        self
    }
}

impl PayloadStore for MemoryPayloads {
    fn fetch(&self, key: &str) -> Result<Payload, PayloadError> {
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| PayloadError::UnknownKey(key.to_string()))
    }
}

/// Reads `<dir>/<key>.json` documents of the form `{"value": ...}`.
#[derive(Debug, Clone)]
pub struct DirectoryPayloads {
    dir: PathBuf,
}

impl DirectoryPayloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PayloadStore for DirectoryPayloads {
    fn fetch(&self, key: &str) -> Result<Payload, PayloadError> {
        // keys name a file directly inside `dir`
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(PayloadError::UnknownKey(key.to_string()));
        }

        let path = self.dir.join(format!("{key}.json"));
        debug!(key, path = %path.display(), "loading payload");

        let contents = std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => PayloadError::UnknownKey(key.to_string()),
            _ => PayloadError::IO {
                key: key.to_string(),
                source,
            },
        })?;

        parse_document(key, &contents)
    }
}

impl<F> PayloadStore for F
where
    F: Fn(&str) -> Result<Payload, PayloadError> + Send + Sync,
{
    fn fetch(&self, key: &str) -> Result<Payload, PayloadError> {
        self(key)
    }
}

/// Extracts the typed `value` field of a payload document.
pub fn parse_document(key: &str, contents: &str) -> Result<Payload, PayloadError> {
    let doc: Value = serde_json::from_str(contents).map_err(|source| PayloadError::Malformed {
        key: key.to_string(),
        source,
    })?;

    let untyped = |reason: &str| PayloadError::Untyped {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    match doc.get("value") {
        Some(Value::String(s)) => Ok(Payload::Text(s.clone())),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Payload::Number)
            .ok_or_else(|| untyped("number is not an integer")),
        Some(_) => Err(untyped("value is neither text nor number")),
        None => Err(untyped("missing \"value\" field")),
    }
}
