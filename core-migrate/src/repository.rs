//! # Record Store
//!
//! Durable per-item migration state plus the run-session status.
//!
//! ## Overview
//!
//! The store is the only resource workers mutate concurrently. Every write
//! goes through [`RecordStore::upsert`], keyed by `(migrate_type, key)`, so
//! enumerating the same source twice never produces duplicate bookkeeping.
//!
//! `updated_at` is refreshed by the store on every write and is the ordering
//! field used for resumption: [`RecordStore::fetch_unfinished`] only returns
//! records last written before the caller's `older_than` bound.
//!
//! ## Session
//!
//! Session rows are append-only. The most recent row is authoritative; a fresh
//! run appends an `Init` row carrying the configuration fingerprint.

use crate::record::{current_timestamp_micros, MigrationRecord, RecordStatus};
use crate::session::SessionStatus;
use crate::{MigrateError, Result};
use async_trait::async_trait;
use bridge_traits::{MigrateType, SourceAttributes};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository for migration records and the session status
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record, or overwrite the mutable fields of the record with
    /// the same `(migrate_type, key)`. Refreshes `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Store`] if the write fails
    async fn upsert(&self, record: &MigrationRecord) -> Result<()>;

    /// Like [`upsert`](Self::upsert), but a stored row that already reached
    /// `Success` is left untouched
    ///
    /// Returns `false` when the stored success was kept.
    async fn upsert_unless_success(&self, record: &MigrationRecord) -> Result<bool>;

    /// Up to `limit` records of `migrate_type` that are not `Success` and were
    /// last written strictly before `older_than` (UTC microseconds)
    async fn fetch_unfinished(
        &self,
        migrate_type: MigrateType,
        older_than: i64,
        limit: u32,
    ) -> Result<Vec<MigrationRecord>>;

    /// A stable page of all records of `migrate_type`, ordered by id
    async fn fetch_page(
        &self,
        migrate_type: MigrateType,
        page_index: u32,
        page_size: u32,
    ) -> Result<Vec<MigrationRecord>>;

    /// Status of the latest session row, `Init` when none exists
    async fn get_session_status(&self) -> Result<SessionStatus>;

    /// Update the latest session row, creating one if none exists
    async fn set_session_status(&self, status: SessionStatus) -> Result<()>;

    /// Append a fresh `Init` session row for `fingerprint`
    async fn init_session(&self, fingerprint: &str) -> Result<()>;

    /// Whether the latest session row was started with `fingerprint`
    async fn config_matches(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.session_fingerprint().await?.as_deref() == Some(fingerprint))
    }

    /// Fingerprint stored with the latest session row, if any
    async fn session_fingerprint(&self) -> Result<Option<String>>;

    /// Delete every record and session row
    ///
    /// Only valid while the session is `Init`.
    async fn reset_all(&self) -> Result<()>;

    /// Number of records of `migrate_type`
    async fn count_by_type(&self, migrate_type: MigrateType) -> Result<u64>;

    /// Number of records of `migrate_type` in `status`
    async fn count_by_status(&self, migrate_type: MigrateType, status: RecordStatus)
        -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`RecordStore`]
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new store on top of an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migrate_type TEXT NOT NULL,
                source_key TEXT NOT NULL,
                modified_time INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                source_etag TEXT NOT NULL DEFAULT '',
                destination_id TEXT,
                destination_url TEXT,
                status TEXT NOT NULL DEFAULT 'init',
                error_message TEXT,
                error_code TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER,
                attributes TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(migrate_type, source_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_unfinished ON records(migrate_type, status, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                config_fingerprint TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Record store initialized");
        Ok(())
    }

    /// Natural-key upsert; with `keep_success` a stored success wins
    async fn write(&self, record: &MigrationRecord, keep_success: bool) -> Result<bool> {
        let now = current_timestamp_micros();
        let attributes = match &record.attributes {
            Some(attrs) => Some(
                serde_json::to_string(attrs)
                    .map_err(|e| MigrateError::Store(format!("Cannot encode attributes: {}", e)))?,
            ),
            None => None,
        };

        let guard = if keep_success {
            "WHERE records.status != 'success'"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO records (
                migrate_type, source_key, modified_time, size_bytes, source_etag,
                destination_id, destination_url, status, error_message, error_code,
                retry_count, duration_ms, attributes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(migrate_type, source_key) DO UPDATE SET
                modified_time = excluded.modified_time,
                size_bytes = excluded.size_bytes,
                source_etag = excluded.source_etag,
                destination_id = excluded.destination_id,
                destination_url = excluded.destination_url,
                status = excluded.status,
                error_message = excluded.error_message,
                error_code = excluded.error_code,
                retry_count = excluded.retry_count,
                duration_ms = excluded.duration_ms,
                attributes = excluded.attributes,
                updated_at = excluded.updated_at
            {guard}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(record.migrate_type.as_str())
            .bind(&record.key)
            .bind(record.modified_time)
            .bind(record.size_bytes as i64)
            .bind(&record.source_etag)
            .bind(&record.destination_id)
            .bind(&record.destination_url)
            .bind(record.status.as_str())
            .bind(&record.error_message)
            .bind(&record.error_code)
            .bind(record.retry_count as i64)
            .bind(record.duration_ms.map(|ms| ms as i64))
            .bind(attributes)
            .bind(record.created_at)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Database row representation of a record
#[derive(Debug, FromRow)]
struct RecordRow {
    id: i64,
    migrate_type: String,
    source_key: String,
    modified_time: i64,
    size_bytes: i64,
    source_etag: String,
    destination_id: Option<String>,
    destination_url: Option<String>,
    status: String,
    error_message: Option<String>,
    error_code: Option<String>,
    retry_count: i64,
    duration_ms: Option<i64>,
    attributes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RecordRow> for MigrationRecord {
    type Error = MigrateError;

    fn try_from(row: RecordRow) -> Result<Self> {
        let migrate_type: MigrateType = row
            .migrate_type
            .parse()
            .map_err(|_| MigrateError::Store(format!("Invalid migrate_type: {}", row.migrate_type)))?;

        let attributes = match row.attributes.as_deref() {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str::<SourceAttributes>(raw)
                    .map_err(|e| MigrateError::Store(format!("Invalid attributes: {}", e)))?,
            ),
            _ => None,
        };

        Ok(MigrationRecord {
            id: Some(row.id),
            migrate_type,
            key: row.source_key,
            modified_time: row.modified_time,
            size_bytes: row.size_bytes.max(0) as u64,
            source_etag: row.source_etag,
            destination_id: row.destination_id,
            destination_url: row.destination_url,
            status: row.status.parse()?,
            error_message: row.error_message,
            error_code: row.error_code,
            retry_count: row.retry_count.max(0) as u32,
            duration_ms: row.duration_ms.map(|ms| ms.max(0) as u64),
            attributes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<RecordRow>) -> Result<Vec<MigrationRecord>> {
    rows.into_iter().map(MigrationRecord::try_from).collect()
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, record: &MigrationRecord) -> Result<()> {
        self.write(record, false).await.map(|_| ())
    }

    async fn upsert_unless_success(&self, record: &MigrationRecord) -> Result<bool> {
        self.write(record, true).await
    }

    async fn fetch_unfinished(
        &self,
        migrate_type: MigrateType,
        older_than: i64,
        limit: u32,
    ) -> Result<Vec<MigrationRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT * FROM records
            WHERE migrate_type = ? AND status != ? AND updated_at < ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(migrate_type.as_str())
        .bind(RecordStatus::Success.as_str())
        .bind(older_than)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    async fn fetch_page(
        &self,
        migrate_type: MigrateType,
        page_index: u32,
        page_size: u32,
    ) -> Result<Vec<MigrationRecord>> {
        let offset = page_index as i64 * page_size as i64;
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE migrate_type = ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(migrate_type.as_str())
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    async fn get_session_status(&self) -> Result<SessionStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM session ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        match status {
            Some(status) => status.parse(),
            None => Ok(SessionStatus::Init),
        }
    }

    async fn set_session_status(&self, status: SessionStatus) -> Result<()> {
        let now = current_timestamp_micros();
        let updated = sqlx::query(
            r#"
            UPDATE session SET status = ?, updated_at = ?
            WHERE id = (SELECT MAX(id) FROM session)
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO session (status, config_fingerprint, created_at, updated_at) VALUES (?, '', ?, ?)",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        info!(status = %status, "Session status updated");
        Ok(())
    }

    async fn init_session(&self, fingerprint: &str) -> Result<()> {
        let now = current_timestamp_micros();
        sqlx::query(
            "INSERT INTO session (status, config_fingerprint, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(SessionStatus::Init.as_str())
        .bind(fingerprint)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn session_fingerprint(&self) -> Result<Option<String>> {
        let stored = sqlx::query_scalar(
            "SELECT config_fingerprint FROM session ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn reset_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let records = sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM session").execute(&mut *tx).await?;
        tx.commit().await?;

        info!(
            deleted = records.rows_affected(),
            "Discarded bookkeeping from a previous attempt"
        );
        Ok(())
    }

    async fn count_by_type(&self, migrate_type: MigrateType) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE migrate_type = ?")
            .bind(migrate_type.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn count_by_status(
        &self,
        migrate_type: MigrateType,
        status: RecordStatus,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE migrate_type = ? AND status = ?",
        )
        .bind(migrate_type.as_str())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}
