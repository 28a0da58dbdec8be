//! Page-by-page traversal over any `PageSource`.
//!
//! The caller drives the loop:
//! ```ignore
//! let mut pager = Paginator::new(max_pages);
//! while let Some(page) = pager.next_page(&source, &ctx).await? {
//!     // resolve items, then flush
//! }
//! ```
//! Advancing happens at the start of the following `next_page` call, so a
//! page is always fully processed before the source moves on.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::application::context::RunContext;
use crate::domain::HarvestResult;

#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Items of the current page
    async fn fetch_page(&self) -> HarvestResult<Vec<Self::Item>>;

    /// Whether a further page exists; a disabled next control means no
    async fn has_next(&self) -> HarvestResult<bool>;

    async fn advance(&self) -> HarvestResult<()>;

    /// Attempts allowed for `advance`; `None` follows the run's retry policy.
    /// Sources whose advance is not idempotent keep this low.
    fn advance_attempts(&self) -> Option<u32> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    NoNextPage,
    PageLimit,
    /// Fetching the current page kept failing
    FetchFailed,
    /// Moving to the next page kept failing
    AdvanceFailed,
}

#[derive(Debug)]
pub struct Page<T> {
    /// 1-based
    pub number: u32,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalSummary {
    pub pages_visited: u32,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug)]
pub struct Paginator {
    max_pages: Option<u32>,
    pages_visited: u32,
    stop_reason: Option<StopReason>,
}

impl Paginator {
    /// `None` means unbounded
    pub fn new(max_pages: Option<u32>) -> Self {
        Self {
            max_pages,
            pages_visited: 0,
            stop_reason: None,
        }
    }

    pub fn summary(&self) -> TraversalSummary {
        TraversalSummary {
            pages_visited: self.pages_visited,
            stop_reason: self.stop_reason,
        }
    }

    fn stop<T>(&mut self, reason: StopReason) -> HarvestResult<Option<T>> {
        info!("Pagination finished after {} pages: {:?}", self.pages_visited, reason);
        self.stop_reason = Some(reason);
        Ok(None)
    }

    pub async fn next_page<S>(
        &mut self,
        source: &S,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<Option<Page<S::Item>>>
    where
        S: PageSource + ?Sized,
    {
        if self.stop_reason.is_some() {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.pages_visited >= max) {
            return self.stop(StopReason::PageLimit);
        }

        ctx.checkpoint().await?;
        ctx.ensure_online().await?;

        if self.pages_visited > 0 {
            let retrier = ctx.retrier();
            match retrier.run("check next page", || source.has_next()).await {
                Ok(true) => {}
                Ok(false) => return self.stop(StopReason::NoNextPage),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Could not determine whether a next page exists: {}", e);
                    return self.stop(StopReason::AdvanceFailed);
                }
            }
            let advance_policy = source
                .advance_attempts()
                .map_or_else(|| ctx.retry.clone(), |n| ctx.retry.with_attempts(n));
            match ctx
                .retrier_with(&advance_policy)
                .run("advance to next page", || source.advance())
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Could not move past page {}: {}", self.pages_visited, e);
                    return self.stop(StopReason::AdvanceFailed);
                }
            }
        }

        let items = match ctx.retrier().run("fetch page", || source.fetch_page()).await {
            Ok(items) => items,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Giving up on page {}: {}", self.pages_visited + 1, e);
                return self.stop(StopReason::FetchFailed);
            }
        };
        if items.is_empty() {
            return self.stop(StopReason::EmptyPage);
        }

        self.pages_visited += 1;
        debug!("Page {} yielded {} items", self.pages_visited, items.len());
        Ok(Some(Page {
            number: self.pages_visited,
            items,
        }))
    }
}
