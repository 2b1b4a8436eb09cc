//! PostgreSQL destination
//!
//! Pooled connections via deadpool-postgres. The upsert is the literal
//! two-phase contract: UPDATE by primary key first, INSERT when no row
//! matched. Each row is its own autocommitted statement, so a store-level
//! rejection (a foreign-key violation from a not-yet-synced parent, a
//! value out of column range) fails that row alone; only errors outside
//! row scope (connection loss, missing table) abort the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::debug;
use uuid::Uuid;

use crate::config::SyncMode;
use crate::entity::EntityKind;
use crate::error::{Result, SyncError};
use crate::record::{MappedRow, Value};
use crate::run_log::{SyncStatus, UnitCounts};
use crate::sink::{BatchOutcome, Destination, RowFailure, UnitHandle};
use crate::types::SensitiveString;

const POOL_SIZE: usize = 4;

/// Pooled PostgreSQL destination store
#[derive(Debug)]
pub struct PostgresDestination {
    pool: Pool,
}

impl PostgresDestination {
    /// Create a destination over the given connection string. Fails fast on
    /// an unparsable DSN; connectivity itself is probed by [`Destination::check`].
    pub fn connect(connection: &SensitiveString) -> Result<Self> {
        let pg_config: tokio_postgres::Config = connection
            .expose_secret()
            .parse()
            .map_err(|e| SyncError::config(format!("invalid destination connection string: {e}")))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| SyncError::destination(format!("failed to build connection pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            SyncError::destination(format!("failed to acquire destination connection: {e}"))
        })
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn check(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::destination(format!("connectivity check failed: {e}")))?;
        Ok(())
    }

    async fn upsert_batch(&self, kind: EntityKind, rows: &[MappedRow]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let client = self.client().await?;
        let update = client
            .prepare(&update_sql(kind))
            .await
            .map_err(|e| SyncError::destination(e.to_string()))?;
        let insert = client
            .prepare(&insert_sql(kind))
            .await
            .map_err(|e| SyncError::destination(e.to_string()))?;

        for row in rows {
            let boxed: Vec<Box<dyn ToSql + Sync + Send>> =
                row.values.iter().map(value_to_sql).collect();
            let params: Vec<&(dyn ToSql + Sync)> = boxed
                .iter()
                .map(|b| b.as_ref() as &(dyn ToSql + Sync))
                .collect();

            // two-phase upsert: overwrite if the key exists, insert otherwise
            match client.execute(&update, &params).await {
                Ok(0) => match client.execute(&insert, &params).await {
                    Ok(_) => outcome.inserted += 1,
                    Err(e) => outcome.failed.push(row_failure(kind, row.pk, e)?),
                },
                Ok(_) => outcome.updated += 1,
                Err(e) => outcome.failed.push(row_failure(kind, row.pk, e)?),
            }
        }

        debug!(
            entity = %kind,
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.failed.len(),
            "batch written"
        );
        Ok(outcome)
    }

    async fn latest_modified(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(kind.modified_column()),
            quote_ident(kind.table())
        );
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| SyncError::destination(e.to_string()))?;
        Ok(row.get(0))
    }

    async fn begin_unit(
        &self,
        run_id: Uuid,
        mode: SyncMode,
        kind: EntityKind,
    ) -> Result<UnitHandle> {
        let client = self.client().await?;
        let mode_name = mode.to_string();
        let entity_name = kind.table();
        let status_name = SyncStatus::Running.to_string();
        let row = client
            .query_one(
                "INSERT INTO sync_log \
                 (run_id, sync_type, entity_type, status, started_at, \
                  records_processed, records_inserted, records_updated, records_failed) \
                 VALUES ($1, $2, $3, $4, NOW(), 0, 0, 0, 0) \
                 RETURNING id",
                &[&run_id, &mode_name, &entity_name, &status_name],
            )
            .await
            .map_err(|e| SyncError::destination(format!("failed to record unit start: {e}")))?;
        Ok(UnitHandle(row.get(0)))
    }

    async fn update_unit(&self, unit: UnitHandle, counts: &UnitCounts) -> Result<()> {
        let client = self.client().await?;
        let (processed, inserted, updated, failed) = counts_params(counts);
        client
            .execute(
                "UPDATE sync_log SET records_processed = $2, records_inserted = $3, \
                 records_updated = $4, records_failed = $5 WHERE id = $1",
                &[&unit.0, &processed, &inserted, &updated, &failed],
            )
            .await
            .map_err(|e| SyncError::destination(format!("failed to record unit progress: {e}")))?;
        Ok(())
    }

    async fn finish_unit(
        &self,
        unit: UnitHandle,
        status: SyncStatus,
        counts: &UnitCounts,
        error: Option<&str>,
    ) -> Result<()> {
        let client = self.client().await?;
        let status_name = status.to_string();
        let (processed, inserted, updated, failed) = counts_params(counts);
        client
            .execute(
                "UPDATE sync_log SET status = $2, finished_at = NOW(), \
                 records_processed = $3, records_inserted = $4, records_updated = $5, \
                 records_failed = $6, error_message = $7 WHERE id = $1",
                &[
                    &unit.0,
                    &status_name,
                    &processed,
                    &inserted,
                    &updated,
                    &failed,
                    &error,
                ],
            )
            .await
            .map_err(|e| SyncError::destination(format!("failed to record unit finish: {e}")))?;
        Ok(())
    }

    async fn refresh_deal_patterns(&self, deal_ids: &[i64]) -> Result<()> {
        if deal_ids.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        client
            .execute("SELECT refresh_deal_patterns($1)", &[&deal_ids])
            .await
            .map_err(|e| SyncError::destination(format!("pattern refresh failed: {e}")))?;
        Ok(())
    }
}

/// Classify a statement error: database-reported errors are row-scoped,
/// anything else (connection loss, protocol failure) aborts the run.
fn row_failure(kind: EntityKind, id: i64, error: tokio_postgres::Error) -> Result<RowFailure> {
    match error.as_db_error() {
        Some(db_error) => {
            debug!(entity = %kind, id, error = %db_error.message(), "row rejected");
            Ok(RowFailure {
                id,
                error: db_error.message().to_string(),
            })
        }
        None => Err(SyncError::destination(error.to_string())),
    }
}

fn counts_params(counts: &UnitCounts) -> (i64, i64, i64, i64) {
    (
        counts.processed as i64,
        counts.inserted as i64,
        counts.updated as i64,
        counts.failed as i64,
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `UPDATE <table> SET <col> = $n, ... , "updated_at" = NOW() WHERE "id" = $1`
fn update_sql(kind: EntityKind) -> String {
    let assignments: Vec<String> = kind
        .columns()
        .iter()
        .enumerate()
        .skip(1) // the key itself is the match condition
        .map(|(i, column)| format!("{} = ${}", quote_ident(column), i + 1))
        .collect();
    format!(
        "UPDATE {} SET {}, \"updated_at\" = NOW() WHERE \"id\" = $1",
        quote_ident(kind.table()),
        assignments.join(", ")
    )
}

/// `INSERT INTO <table> (<columns>) VALUES ($1, ...)`
fn insert_sql(kind: EntityKind) -> String {
    let columns: Vec<String> = kind.columns().iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=kind.columns().len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(kind.table()),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Convert a mapped value to a statement parameter
fn value_to_sql(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Bool(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::Decimal(v) => Box::new(*v),
        Value::Text(v) => Box::new(v.clone()),
        Value::Timestamp(v) => Box::new(*v),
        Value::Date(v) => Box::new(*v),
        Value::Json(v) => Box::new(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("deals"), "\"deals\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_update_sql_shape() {
        let sql = update_sql(EntityKind::Manager);
        assert_eq!(
            sql,
            "UPDATE \"managers\" SET \"name\" = $2, \"last_name\" = $3, \"email\" = $4, \
             \"work_position\" = $5, \"personal_phone\" = $6, \"personal_mobile\" = $7, \
             \"date_modify\" = $8, \"raw_data\" = $9, \"updated_at\" = NOW() WHERE \"id\" = $1"
        );
    }

    #[test]
    fn test_insert_sql_shape() {
        let sql = insert_sql(EntityKind::Manager);
        assert!(sql.starts_with("INSERT INTO \"managers\" (\"id\", \"name\""));
        assert!(sql.ends_with("$8, $9)"));
    }

    #[test]
    fn test_statement_placeholders_cover_all_columns() {
        for kind in EntityKind::SYNC_ORDER {
            let columns = kind.columns().len();
            let insert = insert_sql(kind);
            assert!(insert.contains(&format!("${columns}")));
            assert!(!insert.contains(&format!("${}", columns + 1)));

            let update = update_sql(kind);
            assert!(update.contains(&format!("${columns}")));
            assert!(update.ends_with("WHERE \"id\" = $1"));
        }
    }

    #[test]
    fn test_connect_rejects_bad_dsn() {
        let err =
            PostgresDestination::connect(&SensitiveString::new("not a dsn")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
