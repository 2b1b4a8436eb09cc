//! Paginated fetch loop for one entity kind
//!
//! Pulls pages lazily through [`SourceApi`], taking a rate-limit token
//! before every physical request (retries included) and applying the retry
//! policy to transient failures. The sequence is restartable only from
//! scratch: there is no mid-stream resume, a failed unit is simply fetched
//! again on the next run.

use std::sync::Arc;

use tracing::debug;

use crate::entity::EntityKind;
use crate::error::SourceError;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry, RetryConfig};
use crate::source::{Page, RecordFilter, SourceApi};

/// Lazy page sequence for one entity kind
pub struct PageFetcher {
    source: Arc<dyn SourceApi>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    kind: EntityKind,
    filter: RecordFilter,
    offset: u64,
    pages: u32,
    records: u64,
    done: bool,
}

impl PageFetcher {
    /// Create a fetcher starting at the first page.
    pub fn new(
        source: Arc<dyn SourceApi>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
        kind: EntityKind,
        filter: RecordFilter,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
            kind,
            filter,
            offset: 0,
            pages: 0,
            records: 0,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>, SourceError> {
        if self.done {
            return Ok(None);
        }

        let kind = self.kind;
        let filter = self.filter;
        let offset = self.offset;
        let source = Arc::clone(&self.source);
        let limiter = Arc::clone(&self.limiter);

        let page = retry(&self.retry, move || {
            let source = Arc::clone(&source);
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await;
                source.fetch_page(kind, &filter, offset).await
            }
        })
        .await?;

        let received = page.records.len() as u64;
        self.pages += 1;
        self.records += received;

        // a short page or a missing cursor ends the sequence
        if (page.records.len() as u32) < self.source.page_size() || page.next.is_none() {
            self.done = true;
        }
        self.offset = page.next.unwrap_or(offset + received);

        debug!(
            entity = %kind,
            offset,
            received,
            done = self.done,
            "page fetched"
        );
        Ok(Some(page))
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// Records fetched so far
    pub fn records_fetched(&self) -> u64 {
        self.records
    }
}
