//! Opaque serializable key/value record used for save/restore across host
//! recreation.
//!
//! The host environment treats the container as an opaque blob; this crate
//! only needs typed put/get plus nested sub-records so each navigation stack
//! can own its slice of the saved state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StateResult;

/// A string-keyed record of serializable values.
///
/// Keys are ordered so serialized output is deterministic, which keeps
/// round-trip assertions in tests stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateContainer {
    entries: BTreeMap<String, serde_json::Value>,
}

impl StateContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under `key`, replacing any previous value.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    /// Read back a value stored under `key`.
    ///
    /// Returns `None` when the key is absent or holds a value of a different
    /// shape; a stale or foreign entry is not an error at this layer.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Store a nested sub-record under `key`.
    pub fn put_child(&mut self, key: &str, child: StateContainer) -> StateResult<()> {
        self.put(key, &child)
    }

    /// Read back a nested sub-record.
    pub fn child(&self, key: &str) -> Option<StateContainer> {
        self.get(key)
    }

    /// Remove the value under `key`, returning whether one was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
