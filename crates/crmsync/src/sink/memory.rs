//! In-memory destination for tests
//!
//! Implements the full [`Destination`] contract over plain maps: the
//! two-phase upsert, watermark queries, the run log, and recorded refresh
//! signals. Row failures can be injected per primary key to exercise the
//! partial-failure paths without a real store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::SyncMode;
use crate::entity::EntityKind;
use crate::error::{Result, SyncError};
use crate::record::{MappedRow, Value};
use crate::run_log::{SyncStatus, UnitCounts};
use crate::sink::{BatchOutcome, Destination, RowFailure, UnitHandle};

/// One recorded sync-log row
#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: i64,
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub kind: EntityKind,
    pub status: SyncStatus,
    pub counts: UnitCounts,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Map-backed destination store
#[derive(Default)]
pub struct MemoryDestination {
    tables: Mutex<BTreeMap<EntityKind, BTreeMap<i64, Vec<Value>>>>,
    log: Mutex<Vec<LogRow>>,
    refreshes: Mutex<Vec<Vec<i64>>>,
    failing_rows: Mutex<BTreeSet<(EntityKind, i64)>>,
}

impl MemoryDestination {
    /// Create an empty destination
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write of the given row, as a store constraint would.
    pub fn with_failing_row(self, kind: EntityKind, id: i64) -> Self {
        self.failing_rows.lock().insert((kind, id));
        self
    }

    /// Rows currently stored for a kind
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables
            .lock()
            .get(&kind)
            .map(|table| table.len())
            .unwrap_or(0)
    }

    /// A stored row's values
    pub fn row(&self, kind: EntityKind, id: i64) -> Option<Vec<Value>> {
        self.tables.lock().get(&kind)?.get(&id).cloned()
    }

    /// Full table contents for state comparisons
    pub fn table_snapshot(&self, kind: EntityKind) -> BTreeMap<i64, Vec<Value>> {
        self.tables.lock().get(&kind).cloned().unwrap_or_default()
    }

    /// All recorded sync-log rows
    pub fn log_rows(&self) -> Vec<LogRow> {
        self.log.lock().clone()
    }

    /// Recorded aggregate-refresh signals, one id list per signal
    pub fn refresh_signals(&self) -> Vec<Vec<i64>> {
        self.refreshes.lock().clone()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn check(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_batch(&self, kind: EntityKind, rows: &[MappedRow]) -> Result<BatchOutcome> {
        let mut tables = self.tables.lock();
        let table = tables.entry(kind).or_default();
        let failing = self.failing_rows.lock();

        let mut outcome = BatchOutcome::default();
        for row in rows {
            if failing.contains(&(kind, row.pk)) {
                outcome.failed.push(RowFailure {
                    id: row.pk,
                    error: "constraint violation".to_string(),
                });
                continue;
            }
            if table.insert(row.pk, row.values.clone()).is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn latest_modified(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>> {
        let idx = kind
            .columns()
            .iter()
            .position(|c| *c == kind.modified_column())
            .ok_or_else(|| {
                SyncError::destination(format!("{kind} has no {} column", kind.modified_column()))
            })?;

        Ok(self
            .tables
            .lock()
            .get(&kind)
            .into_iter()
            .flat_map(|table| table.values())
            .filter_map(|values| values.get(idx).and_then(Value::as_timestamp))
            .max())
    }

    async fn begin_unit(
        &self,
        run_id: Uuid,
        mode: SyncMode,
        kind: EntityKind,
    ) -> Result<UnitHandle> {
        let mut log = self.log.lock();
        let id = log.len() as i64 + 1;
        log.push(LogRow {
            id,
            run_id,
            mode,
            kind,
            status: SyncStatus::Running,
            counts: UnitCounts::default(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        Ok(UnitHandle(id))
    }

    async fn update_unit(&self, unit: UnitHandle, counts: &UnitCounts) -> Result<()> {
        let mut log = self.log.lock();
        let row = log
            .iter_mut()
            .find(|row| row.id == unit.0)
            .ok_or_else(|| SyncError::destination(format!("unknown sync unit {}", unit.0)))?;
        row.counts = *counts;
        Ok(())
    }

    async fn finish_unit(
        &self,
        unit: UnitHandle,
        status: SyncStatus,
        counts: &UnitCounts,
        error: Option<&str>,
    ) -> Result<()> {
        let mut log = self.log.lock();
        let row = log
            .iter_mut()
            .find(|row| row.id == unit.0)
            .ok_or_else(|| SyncError::destination(format!("unknown sync unit {}", unit.0)))?;
        row.status = status;
        row.counts = *counts;
        row.error = error.map(str::to_string);
        row.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn refresh_deal_patterns(&self, deal_ids: &[i64]) -> Result<()> {
        self.refreshes.lock().push(deal_ids.to_vec());
        Ok(())
    }
}
