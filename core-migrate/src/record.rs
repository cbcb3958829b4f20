//! # Migration Records
//!
//! Durable per-item migration state.
//!
//! ## Overview
//!
//! One [`MigrationRecord`] exists per source item, keyed by
//! `(migrate_type, key)`. The controller creates records in `Init`; a worker
//! moves each one to `Success` or `Fail`. Records are plain data. Persistence
//! goes through [`RecordStore`](crate::repository::RecordStore).
//!
//! ## Lifecycle
//!
//! ```text
//! Init ──→ Success
//!   │         ↑
//!   └──→ Fail ┘   (a later invocation may retry a failed record)
//! ```

use crate::{MigrateError, Result};
use bridge_traits::{
    MigrateType, SourceAttributes, SourceItem, SourceRef, TransferError, TransferOutcome,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

// ============================================================================
// Status Types
// ============================================================================

/// Migration status of a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Seeded by the controller, not yet transferred
    Init,
    /// Transferred successfully
    Success,
    /// Last transfer attempt failed
    Fail,
    /// Excluded from migration
    Excluded,
}

impl RecordStatus {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Init => "init",
            RecordStatus::Success => "success",
            RecordStatus::Fail => "fail",
            RecordStatus::Excluded => "exclude",
        }
    }

    /// Whether the record still needs a transfer
    pub fn is_unfinished(&self) -> bool {
        !matches!(self, RecordStatus::Success)
    }
}

impl FromStr for RecordStatus {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "init" => Ok(RecordStatus::Init),
            "success" => Ok(RecordStatus::Success),
            "fail" => Ok(RecordStatus::Fail),
            "exclude" => Ok(RecordStatus::Excluded),
            _ => Err(MigrateError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Record
// ============================================================================

/// Durable migration state of one source item
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    /// Store-assigned row id, `None` until first persisted
    pub id: Option<i64>,
    pub migrate_type: MigrateType,
    /// Source identifier: path, URL, or object key
    pub key: String,
    /// Source modification time, unix seconds
    pub modified_time: i64,
    pub size_bytes: u64,
    pub source_etag: String,
    pub destination_id: Option<String>,
    pub destination_url: Option<String>,
    pub status: RecordStatus,
    pub error_message: Option<String>,
    /// Code of the last failure, used for the error breakdown
    pub error_code: Option<String>,
    /// Retries spent by the last worker invocation
    pub retry_count: u32,
    /// Wall time of the last worker invocation
    pub duration_ms: Option<u64>,
    pub attributes: Option<SourceAttributes>,
    /// Creation time, UTC microseconds
    pub created_at: i64,
    /// Last write time, UTC microseconds; refreshed by the store on every upsert
    pub updated_at: i64,
}

impl MigrationRecord {
    /// Create a pending record for an enumerated source item
    pub fn pending(migrate_type: MigrateType, item: SourceItem) -> Self {
        let now = current_timestamp_micros();
        Self {
            id: None,
            migrate_type,
            key: item.key,
            modified_time: item.modified_time,
            size_bytes: item.size_bytes,
            source_etag: item.etag,
            destination_id: None,
            destination_url: None,
            status: RecordStatus::Init,
            error_message: None,
            error_code: None,
            retry_count: 0,
            duration_ms: None,
            attributes: item.attributes.filter(|attrs| !attrs.is_empty()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve the record to something a transport can read
    pub fn source_ref(&self) -> SourceRef {
        match self.migrate_type {
            MigrateType::Local => SourceRef::LocalFile(PathBuf::from(&self.key)),
            MigrateType::Url => SourceRef::Url(self.key.clone()),
            MigrateType::PullUpload => SourceRef::Pull {
                url: self.key.clone(),
                attributes: self.attributes.clone().unwrap_or_default(),
            },
            MigrateType::Cos | MigrateType::Aws | MigrateType::Ali | MigrateType::Qiniu => {
                SourceRef::Object {
                    key: self.key.clone(),
                }
            }
        }
    }

    /// Record a successful transfer
    pub fn mark_success(&mut self, outcome: TransferOutcome) {
        self.status = RecordStatus::Success;
        self.destination_id = Some(outcome.destination_id);
        self.destination_url = outcome.destination_url;
        self.error_message = Some(String::new());
        self.error_code = None;
    }

    /// Record a failed transfer; the message embeds the local time of failure
    pub fn mark_failed(&mut self, error: &TransferError) {
        self.status = RecordStatus::Fail;
        self.error_message = Some(format!(
            "error: {}, time: {}",
            error,
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
        ));
        self.error_code = Some(error.code.clone());
    }
}

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Current UTC time in microseconds
///
/// Strictly increasing within the process, so a write stamped after a
/// scheduler's `run_start` always compares greater than it.
pub fn current_timestamp_micros() -> i64 {
    let now = chrono::Utc::now().timestamp_micros();
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::TransferErrorKind;

    #[test]
    fn test_record_status_round_trip() {
        for status in [
            RecordStatus::Init,
            RecordStatus::Success,
            RecordStatus::Fail,
            RecordStatus::Excluded,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
        }
        assert!("done".parse::<RecordStatus>().is_err());
        assert!(RecordStatus::Fail.is_unfinished());
        assert!(!RecordStatus::Success.is_unfinished());
    }

    #[test]
    fn test_pending_record_from_item() {
        let item = SourceItem::new("/data/a.mp4")
            .with_size(42)
            .with_modified_time(1_700_000_000)
            .with_etag("abc");
        let record = MigrationRecord::pending(MigrateType::Local, item);

        assert_eq!(record.status, RecordStatus::Init);
        assert_eq!(record.size_bytes, 42);
        assert_eq!(record.source_etag, "abc");
        assert!(record.id.is_none());
        assert!(record.attributes.is_none());
        assert_eq!(
            record.source_ref(),
            SourceRef::LocalFile(PathBuf::from("/data/a.mp4"))
        );
    }

    #[test]
    fn test_pull_record_carries_attributes() {
        let attrs = SourceAttributes {
            media_name: Some("clip".to_string()),
            class_id: Some(7),
            storage_path: None,
        };
        let item = SourceItem::new("https://cdn.example.com/clip.mp4").with_attributes(attrs.clone());
        let record = MigrationRecord::pending(MigrateType::PullUpload, item);

        assert_eq!(
            record.source_ref(),
            SourceRef::Pull {
                url: "https://cdn.example.com/clip.mp4".to_string(),
                attributes: attrs,
            }
        );
    }

    #[test]
    fn test_bucket_record_resolves_to_object() {
        let record = MigrationRecord::pending(MigrateType::Cos, SourceItem::new("videos/a.mp4"));
        assert_eq!(
            record.source_ref(),
            SourceRef::Object {
                key: "videos/a.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut previous = current_timestamp_micros();
        for _ in 0..1000 {
            let next = current_timestamp_micros();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_mark_failed_then_success() {
        let mut record = MigrationRecord::pending(MigrateType::Url, SourceItem::new("https://a/b.mp3"));

        let error = TransferError::new(TransferErrorKind::Transient, "NETWORK", "connection reset");
        record.mark_failed(&error);
        assert_eq!(record.status, RecordStatus::Fail);
        assert_eq!(record.error_code.as_deref(), Some("NETWORK"));
        let message = record.error_message.clone().unwrap();
        assert!(message.starts_with("error: [NETWORK] connection reset, time: "));

        record.mark_success(TransferOutcome {
            destination_id: "5285890784246869930".to_string(),
            destination_url: Some("https://vod.example.com/b.mp3".to_string()),
        });
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.error_message.as_deref(), Some(""));
        assert!(record.error_code.is_none());
    }
}
