//! Schema-less attribute bag.
//!
//! An [`AttributeBag`] is the storage primitive underneath profiles and
//! wallets: one bag per entity, arbitrary string keys, arbitrary JSON values.
//! [`serde_json::Value::Null`] is the explicit "no value" marker, which is
//! why the bag distinguishes [`has`](AttributeBag::has) (key present) from
//! [`has_strict`](AttributeBag::has_strict) (key present with a real value).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;

/// Bulk key/value container owned by a single entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag {
    attributes: BTreeMap<String, Value>,
}

impl AttributeBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The stored value, or `default` when the key is absent.
    ///
    /// An explicit `Null` is returned as-is.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.attributes
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    /// Deserialize the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or holds `Null`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        debug!(key = %key, "attributes.set");
        self.attributes.insert(key, value.into());
    }

    /// Insert or replace every entry of `values`.
    pub fn set_many<I, K>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let before = self.attributes.len();
        self.attributes
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        debug!(before, after = self.attributes.len(), "attributes.set_many");
    }

    /// `true` if the key exists, even when it holds `Null`.
    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// `true` only if the key exists and holds something other than `Null`.
    pub fn has_strict(&self, key: &str) -> bool {
        matches!(self.attributes.get(key), Some(value) if !value.is_null())
    }

    /// Negation of [`has`](Self::has).
    pub fn missing(&self, key: &str) -> bool {
        !self.has(key)
    }

    /// Remove a key and return its former value.
    pub fn forget(&mut self, key: &str) -> Option<Value> {
        debug!(key = %key, "attributes.forget");
        self.attributes.remove(key)
    }

    /// Remove every entry.
    pub fn flush(&mut self) {
        debug!(entries = self.attributes.len(), "attributes.flush");
        self.attributes.clear();
    }

    /// The whole bag.
    pub fn all(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// A copy of the listed keys that are present.
    pub fn only<S: AsRef<str>>(&self, keys: &[S]) -> BTreeMap<String, Value> {
        keys.iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.attributes
                    .get(key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }

    /// A copy of every entry except the listed keys.
    pub fn except<S: AsRef<str>>(&self, keys: &[S]) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(key, _)| !keys.iter().any(|k| k.as_ref() == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for AttributeBag {
    fn from(attributes: BTreeMap<String, Value>) -> Self {
        Self { attributes }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for AttributeBag {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut bag = Self::new();
        bag.set_many(iter);
        bag
    }
}
