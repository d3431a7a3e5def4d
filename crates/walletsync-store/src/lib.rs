//! # walletsync-store
//!
//! Local storage primitives for walletsync.
//!
//! Provides a time-bound value cache backed by `moka`, schema-less
//! attribute bags, a per-network host registry on `DashMap`, and the
//! profile entity that owns one bag and one registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Profile (uuid v7 id, password guard)   │
//! │    ├── AttributeBag (BTreeMap<_, Value>) │
//! │    └── HostRegistry (DashMap, per scope) │
//! ├─────────────────────────────────────────┤
//! │  TtlCache (moka, per-entry expiry,      │
//! │            SHA-256 hashed keys)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use walletsync_store::{HostEntry, Profile, TtlCache};
//!
//! let cache = TtlCache::builder("ark.devnet").max_capacity(1000).build();
//! cache.set("fees", &[10_000_000u64], 60).unwrap();
//!
//! let mut profile = Profile::new();
//! profile.attributes_mut().set("NAME", "Main");
//! profile
//!     .hosts()
//!     .push(HostEntry::new("ark.devnet", "full", "https://dwallets.ark.io/api"));
//! ```

pub mod attributes;
pub mod cache;
pub mod config;
pub mod error;
pub mod hosts;
pub mod profile;

// ── re-exports ───────────────────────────────────────────────────────

pub use attributes::AttributeBag;
pub use cache::{CacheEntry, CacheStats, TtlCache, TtlCacheBuilder};
pub use config::CacheConfig;
pub use error::{StoreError, StoreResult};
pub use hosts::{HostEntry, HostRegistry};
pub use profile::{PASSWORD_KEY, PasswordGuard, Profile, ProfileData};
