//! Provide a [`Context`] shared by the executor, resolvers and extensions of one request.
//!
//! The context is the "context value" of a GraphQL execution: an opaque bag of
//! request-scoped data. Entries are stored as JSON so that any serializable
//! type can be put in and read back from it.

use std::sync::Arc;

use dashmap::DashMap;
use displaydoc::Display;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::json_ext::Value;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// Errors raised when converting context entries from or to JSON.
#[derive(Error, Display, Debug)]
pub enum ContextError {
    /// could not read context entry '{key}': {error}
    Read {
        key: String,
        error: serde_json::Error,
    },
    /// could not store context entry '{key}': {error}
    Write {
        key: String,
        error: serde_json::Error,
    },
}

/// Request-scoped values, cheap to clone and safe to share between threads.
///
/// Clones share their entries.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Entries,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the entry stored under `key` as a `V`.
    pub fn get<V>(&self, key: &str) -> Result<Option<V>, ContextError>
    where
        V: DeserializeOwned,
    {
        self.entries
            .get(key)
            .map(|value| serde_json_bytes::from_value(value.value().clone()))
            .transpose()
            .map_err(|error| ContextError::Read {
                key: key.to_string(),
                error,
            })
    }

    /// Store `value` under `key`, returning the raw value it replaced.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<Value>, ContextError>
    where
        K: Into<String>,
        V: Serialize,
    {
        let key = key.into();
        match serde_json_bytes::to_value(value) {
            Ok(value) => Ok(self.entries.insert(key, value)),
            Err(error) => Err(ContextError::Write { key, error }),
        }
    }

    /// Replace the entry under `key` by `upsert(current)`, starting from `default()`
    /// when the key is absent.
    pub fn upsert<K, V>(
        &self,
        key: K,
        upsert: impl FnOnce(V) -> V,
        default: impl FnOnce() -> V,
    ) -> Result<(), ContextError>
    where
        K: Into<String>,
        V: DeserializeOwned + Serialize,
    {
        let key = key.into();
        let mut entry = self.entries.entry(key.clone()).or_insert(Value::Null);
        let current = match entry.value() {
            Value::Null => default(),
            value => serde_json_bytes::from_value(value.clone()).map_err(|error| {
                ContextError::Read {
                    key: key.clone(),
                    error,
                }
            })?,
        };
        *entry.value_mut() = serde_json_bytes::to_value(upsert(current))
            .map_err(|error| ContextError::Write { key, error })?;
        Ok(())
    }

    /// Remove the entry under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
