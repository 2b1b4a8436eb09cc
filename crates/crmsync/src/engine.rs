//! Sync orchestrator
//!
//! Drives one run: entity kinds in dependency order, each as its own
//! logged unit of work fed by the fetch → map → upsert pipeline. Unit
//! failures (exhausted retries, a malformed page, cancellation) are
//! recorded and the run moves on; only configuration and destination
//! errors abort the run as a whole. After a unit completes, the affected
//! deal ids are signaled to the destination for aggregate recomputation
//! without blocking the run.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{SyncConfig, SyncMode};
use crate::entity::EntityKind;
use crate::error::Result;
use crate::mapper::{affected_deal, map_record};
use crate::rate_limit::RateLimiter;
use crate::run_log::{RunLogger, RunSummary, SyncStatus, UnitCounts, UnitReport};
use crate::sink::Destination;
use crate::source::{PageFetcher, RecordFilter, SourceApi};

/// The synchronization engine
pub struct SyncEngine {
    config: SyncConfig,
    source: Arc<dyn SourceApi>,
    destination: Arc<dyn Destination>,
    limiter: Arc<RateLimiter>,
}

impl SyncEngine {
    /// Create an engine. The rate limiter is built from the configured
    /// ceiling and shared by every fetcher of the run.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SourceApi>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.requests_per_second));
        Self {
            config,
            source,
            destination,
            limiter,
        }
    }

    /// Execute one run. Returns the summary on any non-fatal outcome;
    /// failed units are reported in the summary and the run log rather
    /// than as an error.
    pub async fn run(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<RunSummary> {
        // destination reachability is a precondition for every unit
        self.destination.check().await?;

        let run_id = Uuid::new_v4();
        let logger = RunLogger::new(Arc::clone(&self.destination), run_id, self.config.sync_mode);
        info!(run_id = %run_id, mode = %self.config.sync_mode, "sync run starting");

        let mut shutdown = ShutdownLatch::new(shutdown);
        let mut units = Vec::new();
        for kind in EntityKind::SYNC_ORDER {
            if shutdown.requested() {
                info!(entity = %kind, "shutdown requested, no further units started");
                break;
            }
            let report = self.sync_unit(&logger, kind, &mut shutdown).await?;
            units.push(report);
        }

        let summary = RunSummary {
            run_id,
            mode: self.config.sync_mode,
            units,
        };
        let totals = summary.totals();
        if summary.is_success() {
            info!(run_id = %run_id, %totals, "sync run completed");
        } else {
            let failed: Vec<String> = summary
                .failed_units()
                .map(|u| u.kind.to_string())
                .collect();
            warn!(
                run_id = %run_id,
                %totals,
                failed_units = %failed.join(", "),
                "sync run completed with failures"
            );
        }
        info!(limiter = %self.limiter.stats(), "source budget");
        Ok(summary)
    }

    async fn sync_unit(
        &self,
        logger: &RunLogger,
        kind: EntityKind,
        shutdown: &mut ShutdownLatch<'_>,
    ) -> Result<UnitReport> {
        let filter = match self.lower_bound(kind).await? {
            Some(bound) => RecordFilter::modified_after(bound),
            None => RecordFilter::all(),
        };
        let unit = logger.begin(kind).await?;
        info!(
            entity = %kind,
            modified_after = ?filter.modified_after,
            "sync unit started"
        );

        let mut counts = UnitCounts::default();
        let mut affected: BTreeSet<i64> = BTreeSet::new();
        let mut fetcher = PageFetcher::new(
            Arc::clone(&self.source),
            Arc::clone(&self.limiter),
            self.config.retry_config(),
            kind,
            filter,
        );

        let result: std::result::Result<(), String> = loop {
            if shutdown.requested() {
                break Err("cancelled by shutdown signal".to_string());
            }
            let page = match fetcher.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break Ok(()),
                // retries exhausted or a terminal source error: this unit
                // fails, the run continues
                Err(e) => break Err(e.to_string()),
            };

            counts.processed += page.records.len() as u64;
            let mut rows = Vec::with_capacity(page.records.len());
            for raw in &page.records {
                match map_record(kind, raw) {
                    Ok(row) => {
                        if let Some(deal_id) = affected_deal(kind, row.pk, raw) {
                            affected.insert(deal_id);
                        }
                        rows.push(row);
                    }
                    Err(e) => {
                        counts.failed += 1;
                        warn!(entity = %kind, error = %e, "record failed to map");
                    }
                }
            }

            let outcome = self.destination.upsert_batch(kind, &rows).await?;
            for failure in &outcome.failed {
                warn!(entity = %kind, id = failure.id, error = %failure.error, "row rejected");
            }
            counts.apply(&outcome);
            logger.progress(unit, &counts).await?;
            debug!(entity = %kind, %counts, "page committed");
        };

        match result {
            Ok(()) => {
                logger
                    .finish(unit, SyncStatus::Completed, &counts, None)
                    .await?;
                info!(entity = %kind, %counts, "sync unit completed");
                if !affected.is_empty() {
                    self.signal_refresh(kind, affected);
                }
                Ok(UnitReport {
                    kind,
                    status: SyncStatus::Completed,
                    counts,
                    error: None,
                })
            }
            Err(message) => {
                logger
                    .finish(unit, SyncStatus::Failed, &counts, Some(&message))
                    .await?;
                error!(entity = %kind, %counts, error = %message, "sync unit failed");
                Ok(UnitReport {
                    kind,
                    status: SyncStatus::Failed,
                    counts,
                    error: Some(message),
                })
            }
        }
    }

    /// Selection lower bound for a kind: nothing in full mode, watermark
    /// minus the safety overlap in incremental mode. An empty destination
    /// table means no watermark and an unbounded fetch.
    async fn lower_bound(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>> {
        match self.config.sync_mode {
            SyncMode::Full => Ok(None),
            SyncMode::Incremental => {
                let watermark = self.destination.latest_modified(kind).await?;
                Ok(watermark.map(|mark| mark - self.config.lookback()))
            }
        }
    }

    /// Fire-and-forget aggregate recomputation for the deals a completed
    /// unit touched.
    fn signal_refresh(&self, kind: EntityKind, affected: BTreeSet<i64>) {
        let ids: Vec<i64> = affected.into_iter().collect();
        info!(entity = %kind, deals = ids.len(), "signaling deal pattern recomputation");
        let destination = Arc::clone(&self.destination);
        tokio::spawn(async move {
            if let Err(e) = destination.refresh_deal_patterns(&ids).await {
                warn!(error = %e, "deal pattern refresh signal failed");
            }
        });
    }
}

/// Non-blocking shutdown probe. Latches: once a signal is observed, every
/// later probe reports it too, so one message stops the whole run and not
/// just the unit that happened to consume it.
struct ShutdownLatch<'a> {
    receiver: &'a mut broadcast::Receiver<()>,
    requested: bool,
}

impl<'a> ShutdownLatch<'a> {
    fn new(receiver: &'a mut broadcast::Receiver<()>) -> Self {
        Self {
            receiver,
            requested: false,
        }
    }

    fn requested(&mut self) -> bool {
        use broadcast::error::TryRecvError;
        if !self.requested {
            self.requested = match self.receiver.try_recv() {
                Ok(()) => true,
                Err(TryRecvError::Lagged(_)) => true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
            };
        }
        self.requested
    }
}
