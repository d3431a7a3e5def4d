//! walletsync sync kernel.
//!
//! This crate turns paginated remote collections into aggregated results:
//!
//! - **[`executor`]** -- Bounded concurrency executor with fail-fast and
//!   settle-all collection modes, driven by
//!   [`futures::stream::StreamExt::buffer_unordered`].
//! - **[`source`]** -- The [`PagedSource`] collaborator contract, page
//!   cursors, and pagination metadata.
//! - **[`sync`]** -- Serial and parallel strategies behind the
//!   [`SyncStrategy`] trait, bound to a source by [`Synchronizer`].
//! - **[`config`]** -- Strategy selection and fan-out limits.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a tokio
//! runtime.  Nothing here spawns threads; concurrency is cooperative.

pub mod config;
pub mod error;
pub mod executor;
pub mod source;
pub mod sync;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::{StrategyKind, SyncConfig};
pub use error::{KernelError, Result};
pub use executor::{Executor, Operation, Outcome, operation};
pub use source::{Cursor, Page, PagedSource, SyncQuery};
pub use sync::{
    PageFailure, ParallelStrategy, SerialStrategy, SyncOutcome, SyncStrategy, Synchronizer,
};
