//! crmsync - CRM to analytic store synchronization engine
//!
//! Replicates six interdependent entity kinds from a rate-limited CRM REST
//! API into a relational analytic store, then signals per-deal aggregate
//! recomputation over the replicated communications.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   pages    ┌──────────────┐   rows    ┌──────────────┐
//! │  SourceApi   │───────────▶│    Mapper    │──────────▶│ Destination  │
//! │  (REST)      │            │ (typed rows) │           │ (PostgreSQL) │
//! └──────┬───────┘            └──────────────┘           └──────┬───────┘
//!        │ acquire()                                            │
//! ┌──────┴───────┐         ┌───────────────────┐         ┌──────┴───────┐
//! │ RateLimiter  │         │    SyncEngine     │         │   sync_log   │
//! │ (token bkt)  │         │ (dependency order)│         │ deal_patterns│
//! └──────────────┘         └───────────────────┘         └──────────────┘
//! ```
//!
//! A run processes entity kinds in foreign-key dependency order; each kind
//! is a logged unit of work that survives partial failure. Writes are
//! idempotent upserts keyed by the source identifier, so retries and
//! overlapping runs converge. Incremental runs bound each kind's fetch by
//! its destination watermark minus a configurable look-back overlap.

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod rate_limit;
pub mod record;
pub mod retry;
pub mod run_log;
pub mod sink;
pub mod source;
pub mod types;

pub use config::{SyncConfig, SyncMode};
pub use engine::SyncEngine;
pub use entity::EntityKind;
pub use error::{Result, SourceError, SyncError};
pub use rate_limit::RateLimiter;
pub use record::{MappedRow, RawRecord, Value};
pub use run_log::{RunLogger, RunSummary, SyncStatus, UnitCounts, UnitReport};
pub use sink::{BatchOutcome, Destination, MemoryDestination, PostgresDestination};
pub use source::{Page, PageFetcher, RecordFilter, RestSource, SourceApi};
pub use types::SensitiveString;
