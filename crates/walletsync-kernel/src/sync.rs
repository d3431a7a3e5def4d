//! Paginated synchronizer.
//!
//! A [`Synchronizer`] turns a [`PagedSource`] into a single aggregated list
//! using one of two interchangeable [`SyncStrategy`] implementations:
//!
//! - [`SerialStrategy`] follows `next_page` cursors one at a time.  Output is
//!   in ascending page order and the first fetch error aborts the run with
//!   [`KernelError::SyncAborted`].
//! - [`ParallelStrategy`] fetches page 1, then fans the remaining pages out
//!   through the bounded [`Executor`].  Items from later pages are appended as
//!   each fetch completes, so cross-page order is completion order.  Pages
//!   that fail are listed in [`SyncOutcome::failed_pages`] next to the
//!   partial result.
//!
//! # Example
//!
//! ```rust,ignore
//! let synchronizer = Synchronizer::from_config(source, &SyncConfig::parallel(4))?;
//! let delegates = synchronizer.sync_all(&SyncQuery::new()).await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_MAX_PAGES, StrategyKind, SyncConfig};
use crate::error::{KernelError, Result};
use crate::executor::{Executor, Operation, Outcome, operation};
use crate::source::{Cursor, PagedSource, SyncQuery};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A page that could not be fetched during a parallel run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page: u64,
    pub reason: String,
}

/// Aggregated result of one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome<T> {
    pub items: Vec<T>,
    /// Pages missing from `items`.  Always empty for the serial strategy.
    pub failed_pages: Vec<PageFailure>,
}

impl<T> SyncOutcome<T> {
    fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            failed_pages: Vec::new(),
        }
    }

    /// `true` when every page contributed its items.
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    /// The items, or [`KernelError::PartialSync`] if any page failed.
    pub fn into_items(self) -> Result<Vec<T>> {
        if self.failed_pages.is_empty() {
            Ok(self.items)
        } else {
            Err(KernelError::PartialSync {
                failed_pages: self.failed_pages.iter().map(|f| f.page).collect(),
            })
        }
    }
}

/// Shared contract of the serial and parallel strategies.
#[async_trait]
pub trait SyncStrategy<T: Send + 'static>: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn sync(&self, source: &dyn PagedSource<T>, query: &SyncQuery) -> Result<SyncOutcome<T>>;
}

fn aborted(cursor: Option<&Cursor>, source: KernelError) -> KernelError {
    KernelError::SyncAborted {
        page: cursor.map_or_else(|| "1".to_string(), ToString::to_string),
        source: Box::new(source),
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// Fetches pages one after another, following the source's cursors.
#[derive(Debug, Clone)]
pub struct SerialStrategy {
    max_pages: u64,
}

impl SerialStrategy {
    pub fn new() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Stop with [`KernelError::PageLimitExceeded`] after `max_pages` fetches.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }
}

impl Default for SerialStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> SyncStrategy<T> for SerialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Serial
    }

    #[instrument(skip_all, fields(strategy = "serial"))]
    async fn sync(&self, source: &dyn PagedSource<T>, query: &SyncQuery) -> Result<SyncOutcome<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut fetched: u64 = 0;

        loop {
            if fetched >= self.max_pages {
                return Err(KernelError::PageLimitExceeded {
                    limit: self.max_pages,
                });
            }

            let page = source
                .fetch_page(query, cursor.as_ref())
                .await
                .map_err(|e| aborted(cursor.as_ref(), e))?;
            fetched += 1;

            debug!(
                page = %page.current_page,
                count = page.items.len(),
                has_more = page.has_more_pages,
                "page fetched"
            );

            let has_more = page.has_more_pages;
            let next = page.next_cursor();
            items.extend(page.items);

            if !has_more {
                break;
            }
            match next {
                Some(next) => cursor = Some(next),
                None => {
                    warn!(pages = fetched, "source reports more pages but no next cursor");
                    break;
                }
            }
        }

        info!(pages = fetched, items = items.len(), "serial sync finished");
        Ok(SyncOutcome::complete(items))
    }
}

// ---------------------------------------------------------------------------
// Parallel
// ---------------------------------------------------------------------------

/// Fetches page 1, then every remaining page through a bounded [`Executor`].
#[derive(Debug, Clone)]
pub struct ParallelStrategy {
    executor: Executor,
    max_pages: u64,
}

impl ParallelStrategy {
    /// Keep at most `concurrency` page fetches in flight.
    pub fn new(concurrency: usize) -> Self {
        Self {
            executor: Executor::new(concurrency),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.executor.concurrency()
    }
}

impl Default for ParallelStrategy {
    fn default() -> Self {
        Self {
            executor: Executor::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> SyncStrategy<T> for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    #[instrument(skip_all, fields(strategy = "parallel"))]
    async fn sync(&self, source: &dyn PagedSource<T>, query: &SyncQuery) -> Result<SyncOutcome<T>> {
        let first = source
            .fetch_page(query, None)
            .await
            .map_err(|e| aborted(None, e))?;

        let Some((current, last)) = first.page_numbers() else {
            debug!(
                current = %first.current_page,
                last = %first.last_page,
                "non-numeric page markers, treating first page as the only page"
            );
            return Ok(SyncOutcome::complete(first.items));
        };

        if last <= current {
            debug!(current, last, "single page response");
            return Ok(SyncOutcome::complete(first.items));
        }

        // Page 1 is already fetched and counts against the limit.
        if last - current >= self.max_pages {
            return Err(KernelError::PageLimitExceeded {
                limit: self.max_pages,
            });
        }

        let pages: Vec<u64> = (current + 1..=last).collect();
        debug!(
            current,
            last,
            remaining = pages.len(),
            concurrency = self.executor.concurrency(),
            "fanning out page fetches"
        );

        let collected = Mutex::new(first.items);
        let shared = &collected;
        let operations: Vec<Operation<'_, usize, KernelError>> = pages
            .iter()
            .map(|&page| {
                operation(move || async move {
                    let cursor = Cursor::Number(page);
                    let fetched = source.fetch_page(query, Some(&cursor)).await?;
                    let count = fetched.items.len();
                    let mut items = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    items.extend(fetched.items);
                    Ok::<usize, KernelError>(count)
                })
            })
            .collect();

        let outcomes = self.executor.settle_all(operations).await;

        let failed_pages: Vec<PageFailure> = pages
            .iter()
            .zip(outcomes)
            .filter_map(|(&page, outcome)| match outcome {
                Outcome::Fulfilled(_) => None,
                Outcome::Rejected(err) => {
                    warn!(page, error = %err, "page fetch failed");
                    Some(PageFailure {
                        page,
                        reason: err.to_string(),
                    })
                }
            })
            .collect();

        let items = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
        info!(
            pages = pages.len() + 1,
            items = items.len(),
            failed = failed_pages.len(),
            "parallel sync finished"
        );

        Ok(SyncOutcome {
            items,
            failed_pages,
        })
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Binds a [`PagedSource`] to the strategy chosen by the caller.
pub struct Synchronizer<T> {
    source: Arc<dyn PagedSource<T>>,
    strategy: Box<dyn SyncStrategy<T>>,
}

impl<T: Send + 'static> Synchronizer<T> {
    pub fn new(source: Arc<dyn PagedSource<T>>, strategy: impl SyncStrategy<T> + 'static) -> Self {
        Self {
            source,
            strategy: Box::new(strategy),
        }
    }

    pub fn serial(source: Arc<dyn PagedSource<T>>) -> Self {
        Self::new(source, SerialStrategy::new())
    }

    pub fn parallel(source: Arc<dyn PagedSource<T>>, concurrency: usize) -> Self {
        Self::new(source, ParallelStrategy::new(concurrency))
    }

    /// Build the strategy described by `config` after validating it.
    pub fn from_config(source: Arc<dyn PagedSource<T>>, config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let synchronizer = match config.strategy {
            StrategyKind::Serial => Self::new(
                source,
                SerialStrategy::new().with_max_pages(config.max_pages),
            ),
            StrategyKind::Parallel => Self::new(
                source,
                ParallelStrategy::new(config.concurrency).with_max_pages(config.max_pages),
            ),
        };
        Ok(synchronizer)
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Run one sync and return the aggregate with any failed pages.
    pub async fn sync(&self, query: &SyncQuery) -> Result<SyncOutcome<T>> {
        info!(strategy = %self.kind(), filters = query.filters().len(), "sync started");
        self.strategy.sync(self.source.as_ref(), query).await
    }

    /// Run one sync and require every page to succeed.
    pub async fn sync_all(&self, query: &SyncQuery) -> Result<Vec<T>> {
        self.sync(query).await?.into_items()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Page;
    use std::collections::HashSet;
    use std::time::Duration;

    /// In-memory source: `pages[i]` holds the items of page `i + 1`.
    struct MockSource {
        pages: Vec<Vec<u32>>,
        failing: HashSet<u64>,
        delays: Vec<u64>,
        fetched: Mutex<Vec<u64>>,
    }

    impl MockSource {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                failing: HashSet::new(),
                delays: Vec::new(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, page: u64) -> Self {
            self.failing.insert(page);
            self
        }

        fn delays(mut self, millis: Vec<u64>) -> Self {
            self.delays = millis;
            self
        }

        fn fetched(&self) -> Vec<u64> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PagedSource<u32> for MockSource {
        async fn fetch_page(&self, _query: &SyncQuery, cursor: Option<&Cursor>) -> Result<Page<u32>> {
            let page = cursor.and_then(Cursor::page_number).unwrap_or(1);
            self.fetched.lock().unwrap().push(page);
            if let Some(&millis) = self.delays.get(page as usize - 1) {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
            if self.failing.contains(&page) {
                return Err(KernelError::fetch(page, "connection reset"));
            }
            let items = self.pages[page as usize - 1].clone();
            Ok(Page::numbered(items, page, self.pages.len() as u64))
        }
    }

    fn three_pages() -> Vec<Vec<u32>> {
        vec![vec![1, 2], vec![3, 4], vec![5]]
    }

    async fn run(
        strategy: &dyn SyncStrategy<u32>,
        source: &dyn PagedSource<u32>,
    ) -> Result<SyncOutcome<u32>> {
        strategy.sync(source, &SyncQuery::new()).await
    }

    #[tokio::test]
    async fn serial_concatenates_in_page_order() {
        let source = MockSource::new(three_pages());
        let outcome = run(&SerialStrategy::new(), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![1, 2, 3, 4, 5]);
        assert!(outcome.is_complete());
        assert_eq!(source.fetched(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn serial_aborts_on_first_failure() {
        let source = MockSource::new(three_pages()).failing(2);
        let result = run(&SerialStrategy::new(), &source).await;
        match result {
            Err(KernelError::SyncAborted { page, .. }) => assert_eq!(page, "2"),
            other => panic!("expected SyncAborted, got {other:?}"),
        }
        // Page 3 is never requested.
        assert_eq!(source.fetched(), vec![1, 2]);
    }

    #[tokio::test]
    async fn serial_page_limit() {
        let source = MockSource::new(three_pages());
        let result = run(&SerialStrategy::new().with_max_pages(2), &source).await;
        assert!(matches!(result, Err(KernelError::PageLimitExceeded { limit: 2 })));
    }

    #[tokio::test]
    async fn parallel_appends_in_completion_order() {
        // Page 2 is slow, page 3 fast: page 3's items land first.
        let source = MockSource::new(three_pages()).delays(vec![0, 40, 0]);
        let outcome = run(&ParallelStrategy::new(4), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![1, 2, 5, 3, 4]);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn parallel_reports_failed_pages() {
        let source = MockSource::new(three_pages()).failing(3);
        let outcome = run(&ParallelStrategy::new(2), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![1, 2, 3, 4]);
        assert_eq!(outcome.failed_pages.len(), 1);
        assert_eq!(outcome.failed_pages[0].page, 3);

        let err = outcome.into_items().unwrap_err();
        assert!(matches!(err, KernelError::PartialSync { ref failed_pages } if failed_pages == &[3]));
    }

    #[tokio::test]
    async fn parallel_first_page_failure_aborts() {
        let source = MockSource::new(three_pages()).failing(1);
        let result = run(&ParallelStrategy::new(2), &source).await;
        assert!(matches!(result, Err(KernelError::SyncAborted { .. })));
    }

    #[tokio::test]
    async fn single_page_never_fans_out() {
        let source = MockSource::new(vec![vec![7, 8, 9]]);
        let outcome = run(&ParallelStrategy::new(4), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![7, 8, 9]);
        assert_eq!(source.fetched(), vec![1]);
    }

    struct OddMarkers {
        current: Cursor,
        last: Cursor,
    }

    #[async_trait]
    impl PagedSource<u32> for OddMarkers {
        async fn fetch_page(&self, _query: &SyncQuery, cursor: Option<&Cursor>) -> Result<Page<u32>> {
            assert!(cursor.is_none(), "only page 1 may be requested");
            Ok(Page {
                items: vec![1],
                current_page: self.current.clone(),
                last_page: self.last.clone(),
                next_page: None,
                has_more_pages: true,
            })
        }
    }

    #[tokio::test]
    async fn parallel_non_numeric_markers_mean_no_more_pages() {
        let source = OddMarkers {
            current: Cursor::from("first"),
            last: Cursor::from("last"),
        };
        let outcome = run(&ParallelStrategy::new(4), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![1]);
    }

    #[tokio::test]
    async fn parallel_last_before_current_means_no_more_pages() {
        let source = OddMarkers {
            current: Cursor::Number(5),
            last: Cursor::from("2"),
        };
        let outcome = run(&ParallelStrategy::new(4), &source).await
            .unwrap();
        assert_eq!(outcome.items, vec![1]);
    }

    #[tokio::test]
    async fn synchronizer_from_config_selects_strategy() {
        let source: Arc<dyn PagedSource<u32>> = Arc::new(MockSource::new(three_pages()));

        let serial = Synchronizer::from_config(Arc::clone(&source), &SyncConfig::serial()).unwrap();
        assert_eq!(serial.kind(), StrategyKind::Serial);
        assert_eq!(serial.sync_all(&SyncQuery::new()).await.unwrap(), vec![1, 2, 3, 4, 5]);

        let parallel = Synchronizer::from_config(source, &SyncConfig::parallel(2)).unwrap();
        assert_eq!(parallel.kind(), StrategyKind::Parallel);
        let mut items = parallel.sync_all(&SyncQuery::new()).await.unwrap();
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let source: Arc<dyn PagedSource<u32>> = Arc::new(MockSource::new(three_pages()));
        let config = SyncConfig {
            concurrency: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(
            Synchronizer::from_config(source, &config),
            Err(KernelError::InvalidConfig { .. })
        ));
    }
}
