//! Destination store abstraction
//!
//! The destination owns three things: the per-kind entity tables written by
//! the upsert path, the durable `sync_log` rows, and the derived-aggregate
//! refresh hook. It sits behind a trait so the engine can run against the
//! in-memory implementation in tests; [`postgres::PostgresDestination`] is
//! the production implementation.

pub mod memory;
pub mod postgres;

pub use memory::MemoryDestination;
pub use postgres::PostgresDestination;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::SyncMode;
use crate::entity::EntityKind;
use crate::error::Result;
use crate::record::MappedRow;
use crate::run_log::{SyncStatus, UnitCounts};

/// Handle to a durable sync-log row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHandle(pub i64);

/// One row that could not be written
#[derive(Debug, Clone)]
pub struct RowFailure {
    /// Primary key of the failed row
    pub id: i64,
    /// Store error message
    pub error: String,
}

/// Result of one batch upsert
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Rows that did not exist and were inserted
    pub inserted: u64,
    /// Rows that existed and were overwritten
    pub updated: u64,
    /// Rows rejected by the store, siblings unaffected
    pub failed: Vec<RowFailure>,
}

impl BatchOutcome {
    /// Rows written either way
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// A relational destination store
///
/// `upsert_batch` follows an explicit two-phase contract per row: overwrite
/// the mapped columns when the primary key exists, insert the row when it
/// does not. Replaying a batch is therefore idempotent, and a single row's
/// rejection never blocks its siblings.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Probe connectivity; failure here is fatal for the run.
    async fn check(&self) -> Result<()>;

    /// Write a batch of mapped rows for one kind.
    async fn upsert_batch(&self, kind: EntityKind, rows: &[MappedRow]) -> Result<BatchOutcome>;

    /// Maximum modification time stored for a kind, bounding the next
    /// incremental selection. `None` when the table holds no rows.
    async fn latest_modified(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>>;

    /// Durably record a unit as running.
    async fn begin_unit(&self, run_id: Uuid, mode: SyncMode, kind: EntityKind)
        -> Result<UnitHandle>;

    /// Update a running unit's counters.
    async fn update_unit(&self, unit: UnitHandle, counts: &UnitCounts) -> Result<()>;

    /// Durably record a unit's terminal state.
    async fn finish_unit(
        &self,
        unit: UnitHandle,
        status: SyncStatus,
        counts: &UnitCounts,
        error: Option<&str>,
    ) -> Result<()>;

    /// Ask the store to recompute derived deal aggregates for the given
    /// deal ids. The engine fires this after a unit completes and does not
    /// wait for the recomputation itself.
    async fn refresh_deal_patterns(&self, deal_ids: &[i64]) -> Result<()>;
}
