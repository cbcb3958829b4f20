//! # Result Reporter
//!
//! Writes the per-record result file and the run summary.
//!
//! ## Overview
//!
//! The reporter pages through every record of the run's migrate type and
//! writes one JSON object per line:
//!
//! ```text
//! {"id":1,"migrateType":"migrateLocal","filename":"/data/a.mp4","lastModified":1700000000,
//!  "filesize":1024,"etag":"","fileId":"5285890784246869930","mediaUrl":"https://...",
//!  "status":"success","errMsg":"","updateTime":"2024-03-01 10:00:00"}
//! ```
//!
//! While paging it accumulates the summary: counts, success rate, throughput
//! and, in detailed mode, the failure breakdown by error code and the average
//! per-item duration. Reporting never changes stored outcomes; callers log a
//! failed report and carry on.

use crate::record::{MigrationRecord, RecordStatus};
use crate::repository::RecordStore;
use crate::{MigrateError, Result};
use bridge_traits::MigrateType;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultLine<'a> {
    id: Option<i64>,
    migrate_type: &'a str,
    filename: &'a str,
    last_modified: i64,
    filesize: u64,
    etag: &'a str,
    file_id: &'a str,
    media_url: &'a str,
    status: &'a str,
    err_msg: &'a str,
    update_time: String,
}

impl<'a> From<&'a MigrationRecord> for ResultLine<'a> {
    fn from(record: &'a MigrationRecord) -> Self {
        Self {
            id: record.id,
            migrate_type: record.migrate_type.as_str(),
            filename: &record.key,
            last_modified: record.modified_time,
            filesize: record.size_bytes,
            etag: &record.source_etag,
            file_id: record.destination_id.as_deref().unwrap_or_default(),
            media_url: record.destination_url.as_deref().unwrap_or_default(),
            status: record.status.as_str(),
            err_msg: record.error_message.as_deref().unwrap_or_default(),
            update_time: format_local_micros(record.updated_at),
        }
    }
}

fn format_local_micros(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Failure count of one error code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub code: String,
    pub count: u64,
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Percentage of records in `Success`
    pub success_rate: f64,
    /// Records per wall-clock second
    pub throughput: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_breakdown: Option<Vec<ErrorCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_retries: Option<u64>,
    /// Average per-item duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_duration: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    total: u64,
    success: u64,
    failed: u64,
    errors: HashMap<String, u64>,
    retries: u64,
    duration_ms: u64,
    timed: u64,
}

impl Accumulator {
    fn add(&mut self, record: &MigrationRecord) {
        self.total += 1;
        match record.status {
            RecordStatus::Success => self.success += 1,
            RecordStatus::Fail => {
                self.failed += 1;
                let code = record.error_code.clone().unwrap_or_else(|| "UNKNOWN".to_string());
                *self.errors.entry(code).or_default() += 1;
            }
            RecordStatus::Init | RecordStatus::Excluded => {}
        }
        self.retries += record.retry_count as u64;
        if let Some(ms) = record.duration_ms {
            self.duration_ms += ms;
            self.timed += 1;
        }
    }

    fn finish(self, elapsed: Duration, detailed: bool) -> ReportSummary {
        let success_rate = if self.total == 0 {
            0.0
        } else {
            round2(self.success as f64 / self.total as f64 * 100.0)
        };
        let throughput = round2(self.total as f64 / elapsed.as_secs_f64().max(0.001));

        let (error_breakdown, total_retries, average_duration) = if detailed {
            let mut breakdown: Vec<ErrorCount> = self
                .errors
                .into_iter()
                .map(|(code, count)| ErrorCount { code, count })
                .collect();
            breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
            let average = if self.timed == 0 {
                0.0
            } else {
                round2(self.duration_ms as f64 / self.timed as f64 / 1000.0)
            };
            (Some(breakdown), Some(self.retries), Some(average))
        } else {
            (None, None, None)
        };

        ReportSummary {
            total: self.total,
            success: self.success,
            failed: self.failed,
            success_rate,
            throughput,
            error_breakdown,
            total_retries,
            average_duration,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Writes the result artifacts of one run
pub struct ResultReporter {
    store: Arc<dyn RecordStore>,
    migrate_type: MigrateType,
    result_path: PathBuf,
    summary_path: Option<PathBuf>,
    page_size: u32,
    detailed: bool,
}

impl ResultReporter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        migrate_type: MigrateType,
        result_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            migrate_type,
            result_path: result_path.into(),
            summary_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            detailed: false,
        }
    }

    /// Also write the summary as JSON to `path`
    pub fn with_summary_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_path = Some(path.into());
        self
    }

    /// Include the error breakdown, retries and average duration
    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Write the result file and return the summary of a run that took `elapsed`
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Report`] if an artifact cannot be written, or a
    /// store error if paging fails
    pub async fn report(&self, elapsed: Duration) -> Result<ReportSummary> {
        let file = tokio::fs::File::create(&self.result_path)
            .await
            .map_err(|e| self.write_error(&self.result_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut accumulator = Accumulator::default();

        let mut page_index = 0;
        loop {
            let page = self
                .store
                .fetch_page(self.migrate_type, page_index, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            for record in &page {
                accumulator.add(record);
                let mut line = serde_json::to_vec(&ResultLine::from(record))
                    .map_err(|e| MigrateError::Report(e.to_string()))?;
                line.push(b'\n');
                writer
                    .write_all(&line)
                    .await
                    .map_err(|e| self.write_error(&self.result_path, e))?;
            }
            page_index += 1;
        }
        writer
            .flush()
            .await
            .map_err(|e| self.write_error(&self.result_path, e))?;

        let summary = accumulator.finish(elapsed, self.detailed);
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            success_rate = summary.success_rate,
            throughput = summary.throughput,
            result_file = %self.result_path.display(),
            "Migration report written"
        );

        if let Some(path) = &self.summary_path {
            let body = serde_json::to_vec_pretty(&serde_json::json!({ "summary": &summary }))
                .map_err(|e| MigrateError::Report(e.to_string()))?;
            tokio::fs::write(path, body)
                .await
                .map_err(|e| self.write_error(path, e))?;
        }

        Ok(summary)
    }

    fn write_error(&self, path: &std::path::Path, e: std::io::Error) -> MigrateError {
        MigrateError::Report(format!("cannot write {}: {}", path.display(), e))
    }
}
