//! PostgreSQL record store.
//!
//! Scans use a server-side `NO SCROLL` cursor declared inside a `READ ONLY`
//! transaction on the scan pool and page through it with `FETCH FORWARD`, so
//! only one page is ever held client-side. Writes run on a separate pool.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use super::{RecordStore, ScanPredicate, ScanSession, WriteTransaction};
use crate::config::DatabaseConfig;
use crate::error::{SweepError, SweepResult};
use crate::models::{NewRecord, Record};

const SCAN_CURSOR_NAME: &str = "eligible_records_scan";

const RECORD_COLUMNS: &str =
    "id, label, marker, created_at, created_by, last_modified_at, last_modified_by";

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    scan_pool: PgPool,
    write_pool: PgPool,
}

impl PgRecordStore {
    /// Build a store from two distinct pools
    pub fn new(scan_pool: PgPool, write_pool: PgPool) -> Self {
        Self {
            scan_pool,
            write_pool,
        }
    }

    /// Build a store whose scans and writes share one pool
    ///
    /// Each session still checks out its own connection, so the pool must hold
    /// at least two.
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(pool.clone(), pool)
    }

    /// Connect both pools; an unreachable database is a configuration error
    pub async fn connect(config: &DatabaseConfig) -> SweepResult<Self> {
        let scan_pool = Self::connect_pool(config, config.scan_pool_size, "scan").await?;
        let write_pool = Self::connect_pool(config, config.write_pool_size, "write").await?;

        info!(
            scan_pool_size = config.scan_pool_size,
            write_pool_size = config.write_pool_size,
            "Connected record store pools"
        );

        Ok(Self::new(scan_pool, write_pool))
    }

    async fn connect_pool(
        config: &DatabaseConfig,
        max_connections: u32,
        role: &str,
    ) -> SweepResult<PgPool> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| SweepError::configuration(format!("cannot connect {role} pool: {e}")))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> SweepResult<()> {
        sqlx::migrate!("./migrations").run(&self.write_pool).await?;
        debug!("Record store migrations applied");
        Ok(())
    }

    pub fn scan_pool(&self) -> &PgPool {
        &self.scan_pool
    }

    pub fn write_pool(&self) -> &PgPool {
        &self.write_pool
    }

    pub async fn close(&self) {
        self.scan_pool.close().await;
        self.write_pool.close().await;
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn open_scan(
        &self,
        predicate: ScanPredicate,
        fetch_size: usize,
    ) -> SweepResult<Box<dyn ScanSession>> {
        let mut tx = self
            .scan_pool
            .begin()
            .await
            .map_err(|e| SweepError::from_store("open scan", e))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| SweepError::from_store("open scan", e))?;

        let declare_sql = format!(
            "DECLARE {SCAN_CURSOR_NAME} NO SCROLL CURSOR FOR \
             SELECT {RECORD_COLUMNS} FROM records WHERE {} ORDER BY id",
            predicate.sql_condition()
        );
        sqlx::query(&declare_sql)
            .persistent(false)
            .execute(&mut *tx)
            .await
            .map_err(|e| SweepError::from_store("declare scan cursor", e))?;

        debug!(predicate = %predicate, fetch_size = fetch_size, "Opened scan cursor");

        Ok(Box::new(PgScanSession {
            tx: Some(tx),
            fetch_sql: format!("FETCH FORWARD {fetch_size} FROM {SCAN_CURSOR_NAME}"),
        }))
    }

    async fn begin_write(&self) -> SweepResult<Box<dyn WriteTransaction>> {
        let tx = self
            .write_pool
            .begin()
            .await
            .map_err(|e| SweepError::from_store("begin write", e))?;
        Ok(Box::new(PgWriteTransaction { tx }))
    }

    async fn count_matching(&self, predicate: ScanPredicate) -> SweepResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM records WHERE {}",
            predicate.sql_condition()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.scan_pool)
            .await
            .map_err(|e| SweepError::from_store("count records", e))?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> SweepResult<()> {
        for pool in [&self.scan_pool, &self.write_pool] {
            sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(pool)
                .await
                .map_err(|e| SweepError::from_store("health check", e))?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Cursor session bound to one read-only transaction on the scan pool
pub struct PgScanSession {
    tx: Option<Transaction<'static, Postgres>>,
    fetch_sql: String,
}

#[async_trait]
impl ScanSession for PgScanSession {
    async fn next_page(&mut self) -> SweepResult<Vec<Record>> {
        let Some(tx) = self.tx.as_mut() else {
            return Ok(Vec::new());
        };

        sqlx::query_as::<_, Record>(&self.fetch_sql)
            .persistent(false)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| SweepError::from_store("fetch page", e))
    }

    async fn close(mut self: Box<Self>) -> SweepResult<()> {
        if let Some(mut tx) = self.tx.take() {
            sqlx::query(&format!("CLOSE {SCAN_CURSOR_NAME}"))
                .persistent(false)
                .execute(&mut *tx)
                .await
                .map_err(|e| SweepError::from_store("close scan", e))?;
            tx.commit()
                .await
                .map_err(|e| SweepError::from_store("close scan", e))?;
        }
        Ok(())
    }
}

/// Write transaction on the write pool
///
/// Dropping it without calling `commit` rolls it back.
pub struct PgWriteTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WriteTransaction for PgWriteTransaction {
    async fn insert_records(&mut self, records: &[NewRecord], actor: &str) -> SweepResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let labels: Vec<String> = records.iter().map(|r| r.label.clone()).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO records (label, created_by, last_modified_by)
            SELECT data.label, $2, $2
            FROM UNNEST($1::TEXT[]) WITH ORDINALITY AS data(label, position)
            ORDER BY data.position
            "#,
        )
        .bind(labels)
        .bind(actor)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| SweepError::from_store("insert records", e))?;

        Ok(result.rows_affected())
    }

    async fn update_markers(&mut self, records: &[Record], actor: &str) -> SweepResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(records.len());
        let mut markers = Vec::with_capacity(records.len());
        for record in records {
            let marker = record.marker.as_deref().ok_or_else(|| {
                SweepError::integrity(
                    "update markers",
                    format!("record {} has no marker assigned", record.id),
                )
            })?;
            ids.push(record.id);
            markers.push(marker.to_string());
        }

        let result = sqlx::query(
            r#"
            UPDATE records AS r
            SET marker = data.marker,
                last_modified_at = NOW(),
                last_modified_by = $3
            FROM UNNEST($1::BIGINT[], $2::TEXT[]) AS data(id, marker)
            WHERE r.id = data.id
              AND r.marker IS NULL
            "#,
        )
        .bind(ids)
        .bind(markers)
        .bind(actor)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| SweepError::from_store("update markers", e))?;

        let affected = result.rows_affected();
        if affected != records.len() as u64 {
            return Err(SweepError::integrity(
                "update markers",
                format!(
                    "expected to mark {} records but {affected} were still eligible",
                    records.len()
                ),
            ));
        }

        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> SweepResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| SweepError::from_store("commit", e))
    }

    async fn rollback(self: Box<Self>) -> SweepResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| SweepError::from_store("rollback", e))
    }
}
