//! Bounded concurrency executor.
//!
//! The executor runs an ordered list of deferred operations (zero-argument
//! thunks returning a future) concurrently on the caller's task, keeping at
//! most [`Executor::concurrency`] of them in flight.  Two collection modes are
//! offered:
//!
//! - [`Executor::fail_fast`] resolves with every value in input order, or with
//!   the first error observed.  Remaining in-flight operations are dropped.
//! - [`Executor::settle_all`] always completes and reports one [`Outcome`]
//!   per operation, in input order.
//!
//! No threads are spawned.  Operations are polled cooperatively through
//! [`futures::stream::StreamExt::buffer_unordered`], so a thunk is not invoked
//! until a slot is free.
//!
//! # Example
//!
//! ```rust
//! # use walletsync_kernel::executor::{Executor, Outcome};
//! # tokio_test_block_on(async {
//! let executor = Executor::new(2);
//! let outcomes = executor
//!     .settle_all((1..=3).map(|n| move || async move {
//!         if n == 2 { Err("boom") } else { Ok(n) }
//!     }))
//!     .await;
//! assert_eq!(outcomes[1], Outcome::Rejected("boom"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Default number of operations kept in flight.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// A boxed deferred operation, for callers that need to mix heterogeneous
/// thunks in one list.
pub type Operation<'a, T, E> =
    Box<dyn FnOnce() -> BoxFuture<'a, std::result::Result<T, E>> + Send + 'a>;

/// Box an async closure into an [`Operation`].
pub fn operation<'a, T, E, F, Fut>(f: F) -> Operation<'a, T, E>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'a,
{
    Box::new(move || Box::pin(f()))
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Settled result of a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Outcome<T, E> {
    /// The operation produced a value.
    Fulfilled(T),
    /// The operation failed with the given reason.
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The fulfilled value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<&E> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(reason) => Err(reason),
        }
    }

    /// Split settled outcomes into fulfilled values and `(index, reason)`
    /// pairs, both in input order.
    pub fn partition(outcomes: Vec<Self>) -> (Vec<T>, Vec<(usize, E)>) {
        let mut values = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Self::Fulfilled(value) => values.push(value),
                Self::Rejected(reason) => failures.push((index, reason)),
            }
        }
        (values, failures)
    }
}

impl<T, E> From<std::result::Result<T, E>> for Outcome<T, E> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(reason) => Self::Rejected(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs deferred operations with an explicit concurrency bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    concurrency: usize,
}

impl Executor {
    /// Create an executor that keeps at most `concurrency` operations in
    /// flight.  A bound of zero is clamped to one.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Create an executor that starts every operation immediately.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            concurrency: usize::MAX,
        }
    }

    /// Maximum number of operations in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every operation and collect the values in input order.
    ///
    /// Returns the first error observed, in completion order.  Operations
    /// still in flight at that point are dropped without being awaited.
    pub async fn fail_fast<I, F, Fut, T, E>(&self, operations: I) -> std::result::Result<Vec<T>, E>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let operations: Vec<F> = operations.into_iter().collect();
        let total = operations.len();
        tracing::debug!(total, concurrency = self.concurrency, "executor.fail_fast");

        let mut slots: Vec<Option<T>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        let mut running = stream::iter(
            operations
                .into_iter()
                .enumerate()
                .map(|(index, op)| async move { (index, op().await) }),
        )
        .buffer_unordered(self.concurrency);

        while let Some((index, result)) = running.next().await {
            match result {
                Ok(value) => slots[index] = Some(value),
                Err(reason) => {
                    tracing::debug!(index, total, "executor.fail_fast rejected");
                    return Err(reason);
                }
            }
        }

        // Every slot is filled once the stream drains without an error.
        Ok(slots.into_iter().flatten().collect())
    }

    /// Run every operation to completion and report each outcome in input
    /// order.  Never fails.
    pub async fn settle_all<I, F, Fut, T, E>(&self, operations: I) -> Vec<Outcome<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let operations: Vec<F> = operations.into_iter().collect();
        let total = operations.len();
        tracing::debug!(total, concurrency = self.concurrency, "executor.settle_all");

        let mut slots: Vec<Option<Outcome<T, E>>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        let mut running = stream::iter(
            operations
                .into_iter()
                .enumerate()
                .map(|(index, op)| async move { (index, Outcome::from(op().await)) }),
        )
        .buffer_unordered(self.concurrency);

        while let Some((index, outcome)) = running.next().await {
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<Outcome<T, E>> = slots.into_iter().flatten().collect();
        let rejected = outcomes.iter().filter(|o| o.is_rejected()).count();
        tracing::debug!(total, rejected, "executor.settle_all settled");
        outcomes
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok(value: u32) -> Operation<'static, u32, String> {
        operation(move || async move { Ok(value) })
    }

    fn fail(reason: &str) -> Operation<'static, u32, String> {
        let reason = reason.to_string();
        operation(move || async move { Err(reason) })
    }

    fn delayed(value: u32, millis: u64) -> Operation<'static, u32, String> {
        operation(move || async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(value)
        })
    }

    #[tokio::test]
    async fn fail_fast_all_ok_preserves_input_order() {
        let executor = Executor::new(4);
        let values = executor
            .fail_fast(vec![delayed(1, 30), delayed(2, 10), delayed(3, 0)])
            .await
            .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fail_fast_rejects_with_failing_reason() {
        let executor = Executor::default();
        let result = executor.fail_fast(vec![ok(1), fail("nope"), ok(3)]).await;
        assert_eq!(result, Err("nope".to_string()));
    }

    #[tokio::test]
    async fn fail_fast_does_not_wait_for_slow_operations() {
        let executor = Executor::unbounded();
        let started = tokio::time::Instant::now();
        let result = executor
            .fail_fast(vec![delayed(1, 5_000), fail("early")])
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn settle_all_tags_each_outcome_in_order() {
        let executor = Executor::default();
        let outcomes = executor.settle_all(vec![ok(1), fail("nope"), ok(3)]).await;
        assert_eq!(
            outcomes,
            vec![
                Outcome::Fulfilled(1),
                Outcome::Rejected("nope".to_string()),
                Outcome::Fulfilled(3),
            ]
        );
    }

    #[tokio::test]
    async fn settle_all_empty_input() {
        let executor = Executor::default();
        let outcomes = executor.settle_all(Vec::<Operation<'static, u32, String>>::new()).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn concurrency_bound_is_respected() {
        let executor = Executor::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let ops = (0..6).map(|n| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(n)
            }
        });

        let values = executor.fail_fast(ops).await.unwrap();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(Executor::new(0).concurrency(), 1);
    }

    #[test]
    fn partition_splits_values_and_failures() {
        let outcomes: Vec<Outcome<u32, &str>> = vec![
            Outcome::Fulfilled(1),
            Outcome::Rejected("a"),
            Outcome::Fulfilled(3),
        ];
        let (values, failures) = Outcome::partition(outcomes);
        assert_eq!(values, vec![1, 3]);
        assert_eq!(failures, vec![(1, "a")]);
    }

    #[test]
    fn outcome_accessors() {
        let ok: Outcome<u32, &str> = Outcome::Fulfilled(7);
        assert!(ok.is_fulfilled());
        assert_eq!(ok.value(), Some(&7));
        assert_eq!(ok.reason(), None);

        let err: Outcome<u32, &str> = Outcome::Rejected("bad");
        assert!(err.is_rejected());
        assert_eq!(err.into_result(), Err("bad"));
    }
}
