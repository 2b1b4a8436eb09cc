//! Source API abstraction and the paginated fetch layer
//!
//! The engine talks to the source through the [`SourceApi`] trait so the
//! orchestrator and fetcher can be exercised against a scripted in-process
//! source; [`rest::RestSource`] is the production implementation.

pub mod fetcher;
pub mod rest;

pub use fetcher::PageFetcher;
pub use rest::RestSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::EntityKind;
use crate::error::SourceError;
use crate::record::RawRecord;

/// Record selection for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Lower bound on the kind's modification time; `None` selects the
    /// full set
    pub modified_after: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Select every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Select records modified after the given instant
    pub fn modified_after(instant: DateTime<Utc>) -> Self {
        Self {
            modified_after: Some(instant),
        }
    }

    /// Whether the filter bounds the selection
    pub fn is_bounded(&self) -> bool {
        self.modified_after.is_some()
    }
}

/// One page of raw records
#[derive(Debug, Clone)]
pub struct Page {
    /// Records in source order
    pub records: Vec<RawRecord>,
    /// Offset of the next page, absent on the last page
    pub next: Option<u64>,
    /// Total matching records, when the source reports it
    pub total: Option<u64>,
}

/// A paginated record source
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Records per page the source serves; pages shorter than this
    /// terminate the sequence
    fn page_size(&self) -> u32;

    /// Probe connectivity and credentials
    async fn check(&self) -> Result<(), SourceError>;

    /// Fetch one page of records for a kind at the given offset
    async fn fetch_page(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
        offset: u64,
    ) -> Result<Page, SourceError>;
}
