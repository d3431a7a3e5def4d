//! Kernel error types.
//!
//! Every synchronizer, executor and configuration API in this crate surfaces
//! errors through [`KernelError`].  Each variant carries enough context for
//! callers to decide how to handle the failure without inspecting opaque
//! strings.

/// Unified error type for the walletsync sync kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Source errors ------------------------------------------------------
    /// A paged source failed to produce the requested page.
    #[error("fetch failed at cursor {cursor}: {reason}")]
    Fetch { cursor: String, reason: String },

    // -- Synchronizer errors ------------------------------------------------
    /// A page fetch failed during a sync run and the whole run was aborted.
    /// No partial result is returned.
    #[error("sync aborted at page {page}")]
    SyncAborted {
        /// The page (cursor) whose fetch failed.
        page: String,
        #[source]
        source: Box<KernelError>,
    },

    /// One or more pages failed to load while others succeeded.
    #[error("sync incomplete: {} page(s) failed: {failed_pages:?}", failed_pages.len())]
    PartialSync { failed_pages: Vec<u64> },

    /// The source kept reporting more pages past the configured limit.
    #[error("page limit of {limit} exceeded")]
    PageLimitExceeded { limit: u64 },

    // -- Configuration errors -----------------------------------------------
    /// A configuration value is out of range or could not be parsed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

impl KernelError {
    /// Build a [`KernelError::Fetch`] for the given cursor.
    pub fn fetch(cursor: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Fetch {
            cursor: cursor.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
