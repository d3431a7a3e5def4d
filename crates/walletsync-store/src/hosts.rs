//! Per-network host registry.
//!
//! The registry keeps an ordered list of endpoint descriptors for every
//! scope (typically a network id such as `ark.mainnet`).  Entries keep
//! insertion order until removed, and removal is positional: two entries in
//! the same scope may carry the same host and type, so value equality cannot
//! identify them.
//!
//! Internally the registry is backed by [`DashMap`], so it can be shared
//! across tasks without a global `RwLock`.
//!
//! # Example
//!
//! ```rust
//! # use walletsync_store::hosts::{HostEntry, HostRegistry};
//! let registry = HostRegistry::new();
//! registry.push(HostEntry::new("ark.devnet", "full", "https://dwallets.ark.io/api"));
//! registry.push(HostEntry::new("ark.devnet", "explorer", "https://dexplorer.ark.io"));
//!
//! registry.forget("ark.devnet", 0).unwrap();
//! assert_eq!(registry.all_by_network("ark.devnet")[0].kind, "explorer");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A described remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Base URL of the endpoint.
    pub host: String,
    /// Endpoint type, e.g. `full`, `musig`, `explorer`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Grouping key, typically a network id.
    pub scope: String,
}

impl HostEntry {
    pub fn new(scope: impl Into<String>, kind: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            kind: kind.into(),
            enabled: None,
            name: None,
            scope: scope.into(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Entries are usable unless explicitly disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered, per-scope registry of [`HostEntry`] values.
///
/// The registry is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    inner: Arc<DashMap<String, Vec<HostEntry>>>,
}

impl HostRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the end of its scope's list.
    pub fn push(&self, entry: HostEntry) {
        tracing::debug!(scope = %entry.scope, host = %entry.host, kind = %entry.kind, "host pushed");
        self.inner.entry(entry.scope.clone()).or_default().push(entry);
    }

    /// Snapshot of every scope's list.
    pub fn all(&self) -> BTreeMap<String, Vec<HostEntry>> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Entries of one scope in insertion order; empty if the scope is unknown.
    pub fn all_by_network(&self, scope: &str) -> Vec<HostEntry> {
        self.inner
            .get(scope)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Replace the whole registry with `data`.
    pub fn fill(&self, data: BTreeMap<String, Vec<HostEntry>>) {
        self.inner.clear();
        let scopes = data.len();
        for (scope, entries) in data {
            self.inner.insert(scope, entries);
        }
        tracing::info!(scopes, "host registry filled");
    }

    /// Remove the entry at `index` within `scope`; later entries shift down.
    ///
    /// Other scopes are untouched.  An out-of-range index (or unknown scope)
    /// fails with [`StoreError::InvalidPosition`].
    pub fn forget(&self, scope: &str, index: usize) -> StoreResult<HostEntry> {
        let Some(mut entries) = self.inner.get_mut(scope) else {
            return Err(StoreError::InvalidPosition {
                scope: scope.to_string(),
                index,
                len: 0,
            });
        };

        let len = entries.len();
        if index >= len {
            return Err(StoreError::InvalidPosition {
                scope: scope.to_string(),
                index,
                len,
            });
        }

        let removed = entries.remove(index);
        tracing::debug!(scope = %scope, index, host = %removed.host, "host forgotten");
        Ok(removed)
    }

    /// Drop every entry of `scope`, returning them.
    pub fn forget_network(&self, scope: &str) -> Vec<HostEntry> {
        let removed = self
            .inner
            .remove(scope)
            .map(|(_, entries)| entries)
            .unwrap_or_default();
        if !removed.is_empty() {
            tracing::debug!(scope = %scope, count = removed.len(), "network hosts forgotten");
        }
        removed
    }

    /// First enabled entry of the given type within `scope`.
    pub fn select(&self, scope: &str, kind: &str) -> Option<HostEntry> {
        self.inner.get(scope).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.kind == kind && e.is_enabled())
                .cloned()
        })
    }

    /// Scopes that currently have a list (possibly empty), sorted.
    pub fn networks(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        scopes.sort();
        scopes
    }

    /// Total number of entries across all scopes.
    pub fn count(&self) -> usize {
        self.inner.iter().map(|e| e.value().len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scope: &str, host: &str) -> HostEntry {
        HostEntry::new(scope, "full", host)
    }

    #[test]
    fn push_keeps_insertion_order() {
        let registry = HostRegistry::new();
        registry.push(entry("ark.devnet", "https://a"));
        registry.push(entry("ark.devnet", "https://b"));

        let hosts: Vec<String> = registry
            .all_by_network("ark.devnet")
            .into_iter()
            .map(|e| e.host)
            .collect();
        assert_eq!(hosts, vec!["https://a", "https://b"]);
    }

    #[test]
    fn forget_is_positional() {
        let registry = HostRegistry::new();
        let e1 = entry("ark.devnet", "https://same");
        let e2 = entry("ark.devnet", "https://same").named("backup");
        let e3 = entry("ark.devnet", "https://other");
        registry.push(e1.clone());
        registry.push(e2.clone());
        registry.push(e3.clone());

        let removed = registry.forget("ark.devnet", 0).expect("index 0 exists");
        assert_eq!(removed, e1);
        assert_eq!(registry.all_by_network("ark.devnet"), vec![e2, e3]);
    }

    #[test]
    fn forget_leaves_other_scopes() {
        let registry = HostRegistry::new();
        registry.push(entry("ark.devnet", "https://d"));
        registry.push(entry("ark.mainnet", "https://m1"));
        registry.push(entry("ark.mainnet", "https://m2"));

        registry.forget("ark.mainnet", 1).unwrap();
        assert_eq!(registry.all_by_network("ark.devnet").len(), 1);
        assert_eq!(registry.all_by_network("ark.mainnet").len(), 1);
    }

    #[test]
    fn forget_out_of_range() {
        let registry = HostRegistry::new();
        registry.push(entry("ark.devnet", "https://a"));

        let err = registry.forget("ark.devnet", 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidPosition { index: 1, len: 1, .. }
        ));

        let err = registry.forget("unknown", 0).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPosition { len: 0, .. }));
    }

    #[test]
    fn unknown_scope_is_empty() {
        let registry = HostRegistry::new();
        assert!(registry.all_by_network("nowhere").is_empty());
    }

    #[test]
    fn fill_replaces_everything() {
        let registry = HostRegistry::new();
        registry.push(entry("old", "https://old"));

        let mut data = BTreeMap::new();
        data.insert("ark.devnet".to_string(), vec![entry("ark.devnet", "https://new")]);
        registry.fill(data.clone());

        assert_eq!(registry.all(), data);
        assert!(registry.all_by_network("old").is_empty());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn select_skips_disabled_and_other_types() {
        let registry = HostRegistry::new();
        registry.push(HostEntry::new("ark.devnet", "explorer", "https://explorer"));
        registry.push(entry("ark.devnet", "https://off").enabled(false));
        registry.push(entry("ark.devnet", "https://on"));

        let picked = registry.select("ark.devnet", "full").unwrap();
        assert_eq!(picked.host, "https://on");
        assert!(registry.select("ark.devnet", "musig").is_none());
    }

    #[test]
    fn forget_network_drops_scope() {
        let registry = HostRegistry::new();
        registry.push(entry("ark.devnet", "https://a"));
        registry.push(entry("ark.mainnet", "https://b"));

        assert_eq!(registry.forget_network("ark.devnet").len(), 1);
        assert_eq!(registry.networks(), vec!["ark.mainnet".to_string()]);
    }

    #[test]
    fn entry_serializes_type_field() {
        let json = serde_json::to_value(entry("ark.devnet", "https://a")).unwrap();
        assert_eq!(json["type"], "full");
        assert!(json.get("enabled").is_none());
    }
}
