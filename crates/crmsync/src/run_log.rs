//! Durable run log and per-unit accounting
//!
//! Every (mode, entity kind) unit of work gets one durable row in the
//! destination's `sync_log` table, written through the [`Destination`]
//! trait: a `running` row at start, counter updates as pages land, and a
//! terminal update on completion or failure. A crashed process leaves the
//! accurate partial record behind.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::SyncMode;
use crate::entity::EntityKind;
use crate::error::Result;
use crate::sink::{BatchOutcome, Destination, UnitHandle};

/// Lifecycle state of a sync unit. Terminal states are never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    /// Whether the unit has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Counters for one sync unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCounts {
    /// Records fetched from the source
    pub processed: u64,
    /// Rows newly inserted
    pub inserted: u64,
    /// Rows overwritten
    pub updated: u64,
    /// Records that failed to map or write
    pub failed: u64,
}

impl UnitCounts {
    /// Fold a batch write outcome into the counters.
    pub fn apply(&mut self, outcome: &BatchOutcome) {
        self.inserted += outcome.inserted;
        self.updated += outcome.updated;
        self.failed += outcome.failed.len() as u64;
    }

    /// Rows actually written
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl fmt::Display for UnitCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} inserted, {} updated, {} failed",
            self.processed, self.inserted, self.updated, self.failed
        )
    }
}

/// Writer for the durable run log of one sync run
pub struct RunLogger {
    destination: Arc<dyn Destination>,
    run_id: Uuid,
    mode: SyncMode,
}

impl RunLogger {
    /// Create a logger for a run
    pub fn new(destination: Arc<dyn Destination>, run_id: Uuid, mode: SyncMode) -> Self {
        Self {
            destination,
            run_id,
            mode,
        }
    }

    /// The run this logger records
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Durably record a unit as running and return its handle.
    pub async fn begin(&self, kind: EntityKind) -> Result<UnitHandle> {
        self.destination
            .begin_unit(self.run_id, self.mode, kind)
            .await
    }

    /// Update a running unit's counters.
    pub async fn progress(&self, unit: UnitHandle, counts: &UnitCounts) -> Result<()> {
        self.destination.update_unit(unit, counts).await
    }

    /// Durably record a unit's terminal state.
    pub async fn finish(
        &self,
        unit: UnitHandle,
        status: SyncStatus,
        counts: &UnitCounts,
        error: Option<&str>,
    ) -> Result<()> {
        self.destination
            .finish_unit(unit, status, counts, error)
            .await
    }
}

/// Outcome of one unit, as reported in the run summary
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub kind: EntityKind,
    pub status: SyncStatus,
    pub counts: UnitCounts,
    pub error: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub units: Vec<UnitReport>,
}

impl RunSummary {
    /// A run succeeded only if every unit completed.
    pub fn is_success(&self) -> bool {
        self.units.iter().all(|u| u.status == SyncStatus::Completed)
    }

    /// Units that did not complete
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.status == SyncStatus::Failed)
    }

    /// Counter totals across all units
    pub fn totals(&self) -> UnitCounts {
        let mut totals = UnitCounts::default();
        for unit in &self.units {
            totals.processed += unit.counts.processed;
            totals.inserted += unit.counts.inserted;
            totals.updated += unit.counts.updated;
            totals.failed += unit.counts.failed;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RowFailure;

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(SyncStatus::Running.to_string(), "running");
        assert_eq!(SyncStatus::Completed.to_string(), "completed");
        assert_eq!(SyncStatus::Failed.to_string(), "failed");
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }

    #[test]
    fn test_counts_apply() {
        let mut counts = UnitCounts::default();
        counts.processed = 10;
        counts.apply(&BatchOutcome {
            inserted: 7,
            updated: 2,
            failed: vec![RowFailure {
                id: 3,
                error: "fk violation".into(),
            }],
        });
        assert_eq!(counts.inserted, 7);
        assert_eq!(counts.updated, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.written(), 9);
    }

    #[test]
    fn test_summary_success_and_totals() {
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            mode: SyncMode::Full,
            units: vec![
                UnitReport {
                    kind: EntityKind::Manager,
                    status: SyncStatus::Completed,
                    counts: UnitCounts {
                        processed: 3,
                        inserted: 3,
                        updated: 0,
                        failed: 0,
                    },
                    error: None,
                },
                UnitReport {
                    kind: EntityKind::Contact,
                    status: SyncStatus::Failed,
                    counts: UnitCounts {
                        processed: 5,
                        inserted: 4,
                        updated: 0,
                        failed: 1,
                    },
                    error: Some("retries exhausted".into()),
                },
            ],
        };

        assert!(!summary.is_success());
        assert_eq!(summary.failed_units().count(), 1);
        let totals = summary.totals();
        assert_eq!(totals.processed, 8);
        assert_eq!(totals.inserted, 7);
        assert_eq!(totals.failed, 1);
    }
}
