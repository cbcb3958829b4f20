//! # Worker
//!
//! Executes one record's transfer and writes the outcome.
//!
//! ## Overview
//!
//! A worker owns its record for the duration of [`Worker::process`]. It calls
//! the [`Uploader`] and marks the record `Success` or `Fail`. Nothing escapes:
//! transfer errors become a failed record, and a store failure on the final
//! write is retried a bounded number of times and then only logged, so the
//! scheduler always moves on to the next item.
//!
//! ## Pacing
//!
//! The direct-pull variant attaches a [`Pacing`]: every call is admitted by the
//! shared [`RateLimiter`] and failures follow the [`RetryPolicy`]. Without
//! pacing the uploader is invoked once and owns any protocol-level retries.

use crate::rate_limiter::RateLimiter;
use crate::record::{MigrationRecord, RecordStatus};
use crate::repository::RecordStore;
use crate::retry::{RetryDecision, RetryPolicy};
use bridge_traits::{SourceRef, TransferError, TransferOutcome, TransferResult, Uploader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Attempts made at the final record write before giving up
const FINAL_WRITE_ATTEMPTS: u32 = 3;

const FINAL_WRITE_BACKOFF: Duration = Duration::from_millis(200);

// ============================================================================
// Progress
// ============================================================================

/// Run-wide completion counters shared by every worker
#[derive(Debug, Default)]
pub struct ProgressCounters {
    total: AtomicU64,
    success: AtomicU64,
    fail: AtomicU64,
}

/// Point-in-time copy of [`ProgressCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub success: u64,
    pub fail: u64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        ((self.success + self.fail) as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

impl ProgressCounters {
    /// Start from the store's view: all records and those already migrated
    pub fn new(total: u64, already_succeeded: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            success: AtomicU64::new(already_succeeded),
            fail: AtomicU64::new(0),
        }
    }

    pub fn record(&self, status: RecordStatus) -> ProgressSnapshot {
        match status {
            RecordStatus::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.fail.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Rate limiting and retry settings for single-call transports
#[derive(Debug, Clone)]
pub struct Pacing {
    pub limiter: Arc<RateLimiter>,
    pub policy: RetryPolicy,
}

/// Per-item transfer executor
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn RecordStore>,
    uploader: Arc<dyn Uploader>,
    pacing: Option<Pacing>,
    progress: Arc<ProgressCounters>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        uploader: Arc<dyn Uploader>,
        progress: Arc<ProgressCounters>,
    ) -> Self {
        Self {
            store,
            uploader,
            pacing: None,
            progress,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    pub fn progress(&self) -> &Arc<ProgressCounters> {
        &self.progress
    }

    /// Transfer `record` and persist the outcome
    ///
    /// Returns the final status. Never fails.
    pub async fn process(&self, mut record: MigrationRecord) -> RecordStatus {
        let started = Instant::now();
        let source = record.source_ref();

        let (result, retries) = match &self.pacing {
            Some(pacing) => self.transfer_paced(pacing, &source).await,
            None => (self.uploader.transfer(&source).await, 0),
        };

        record.retry_count = retries;
        record.duration_ms = Some(started.elapsed().as_millis() as u64);
        match result {
            Ok(outcome) => {
                debug!(key = %record.key, destination_id = %outcome.destination_id, "Transfer succeeded");
                record.mark_success(outcome);
            }
            Err(e) => {
                warn!(key = %record.key, retries, error = %e, "Transfer failed");
                record.mark_failed(&e);
            }
        }

        self.finish(record, false).await
    }

    /// Record a task the pool abandoned without an outcome
    ///
    /// Used for the forced outer timeout and for panicked tasks. A task that
    /// stored its success just before being abandoned keeps it, and the
    /// returned status is then `Success`.
    pub async fn record_abandoned(
        &self,
        mut record: MigrationRecord,
        error: TransferError,
        elapsed: Duration,
    ) -> RecordStatus {
        warn!(key = %record.key, error = %error, "Task abandoned");
        record.duration_ms = Some(elapsed.as_millis() as u64);
        record.mark_failed(&error);
        self.finish(record, true).await
    }

    async fn transfer_paced(
        &self,
        pacing: &Pacing,
        source: &SourceRef,
    ) -> (TransferResult<TransferOutcome>, u32) {
        let started = Instant::now();
        let mut retries = 0;

        loop {
            let elapsed = started.elapsed();
            if pacing.policy.deadline_passed(elapsed) {
                return (Err(pacing.policy.timeout_error(elapsed)), retries);
            }

            pacing.limiter.acquire().await;
            let error = match self.uploader.transfer(source).await {
                Ok(outcome) => return (Ok(outcome), retries),
                Err(error) => error,
            };

            match pacing.policy.decide(&error, retries) {
                RetryDecision::Retry(delay) => {
                    info!(
                        key = source.display_key(),
                        attempt = retries + 1,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "Retrying transfer"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                RetryDecision::GiveUp => return (Err(error), retries),
            }
        }
    }

    async fn finish(&self, record: MigrationRecord, keep_success: bool) -> RecordStatus {
        let status = record.status;
        if !self.persist(&record, keep_success).await {
            debug!(key = %record.key, "Stored success kept over abandoned task");
            return RecordStatus::Success;
        }

        let progress = self.progress.record(status);
        info!(
            done = progress.success + progress.fail,
            total = progress.total,
            percent = %format!("{:.2}%", progress.percent()),
            success = progress.success,
            fail = progress.fail,
            "Migration progress"
        );
        status
    }

    /// Write the final state; `false` when a stored success was kept instead
    async fn persist(&self, record: &MigrationRecord, keep_success: bool) -> bool {
        for attempt in 1..=FINAL_WRITE_ATTEMPTS {
            let written = if keep_success {
                self.store.upsert_unless_success(record).await
            } else {
                self.store.upsert(record).await.map(|()| true)
            };
            match written {
                Ok(applied) => return applied,
                Err(e) if attempt < FINAL_WRITE_ATTEMPTS => {
                    warn!(key = %record.key, attempt, error = %e, "Record write failed, retrying");
                    tokio::time::sleep(FINAL_WRITE_BACKOFF * attempt).await;
                }
                Err(e) => {
                    error!(
                        key = %record.key,
                        status = %record.status,
                        error = %e,
                        "Giving up on record write"
                    );
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::INTERNAL_TIMEOUT;
    use crate::testing::MemoryRecordStore;
    use async_trait::async_trait;
    use bridge_traits::{MigrateType, SourceItem};
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        Upload {}

        #[async_trait]
        impl Uploader for Upload {
            async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome>;
        }
    }

    /// Fails the first `failures` calls with `error`, then succeeds
    struct FlakyUploader {
        failures: u32,
        error: TransferError,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Uploader for FlakyUploader {
        async fn transfer(&self, _source: &SourceRef) -> TransferResult<TransferOutcome> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(TransferOutcome {
                    destination_id: format!("task-{}", calls),
                    destination_url: None,
                })
            }
        }
    }

    fn store() -> Arc<MemoryRecordStore> {
        Arc::new(MemoryRecordStore::new())
    }

    fn pull_record() -> MigrationRecord {
        MigrationRecord::pending(
            MigrateType::PullUpload,
            SourceItem::new("https://cdn.example.com/a.mp4"),
        )
    }

    fn pacing() -> Pacing {
        Pacing {
            limiter: Arc::new(RateLimiter::new(5)),
            policy: RetryPolicy::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let store = store();
        let uploader = Arc::new(FlakyUploader {
            failures: 2,
            error: TransferError::transient("NETWORK", "reset"),
            calls: Mutex::new(0),
        });
        let worker = Worker::new(
            store.clone(),
            uploader.clone(),
            Arc::new(ProgressCounters::new(1, 0)),
        )
        .with_pacing(pacing());

        let status = worker.process(pull_record()).await;

        assert_eq!(status, RecordStatus::Success);
        assert_eq!(*uploader.calls.lock().unwrap(), 3);
        let stored = store.fetch_page(MigrateType::PullUpload, 0, 1).await.unwrap();
        assert_eq!(stored[0].status, RecordStatus::Success);
        assert_eq!(stored[0].retry_count, 2);
        assert_eq!(stored[0].destination_id.as_deref(), Some("task-3"));
        assert_eq!(worker.progress().snapshot().success, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_makes_one_attempt_without_sleep() {
        let store = store();
        let mut uploader = MockUpload::new();
        uploader
            .expect_transfer()
            .times(1)
            .returning(|_| Err(TransferError::invalid_input("INVALID_URL", "not a url")));
        let worker = Worker::new(
            store.clone(),
            Arc::new(uploader),
            Arc::new(ProgressCounters::new(1, 0)),
        )
        .with_pacing(pacing());

        let started = Instant::now();
        let status = worker.process(pull_record()).await;

        assert_eq!(status, RecordStatus::Fail);
        assert_eq!(started.elapsed(), Duration::ZERO);
        let stored = store.fetch_page(MigrateType::PullUpload, 0, 1).await.unwrap();
        assert_eq!(stored[0].retry_count, 0);
        assert_eq!(stored[0].error_code.as_deref(), Some("INVALID_URL"));
        assert!(stored[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("error: [INVALID_URL] not a url, time: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let store = store();
        let mut uploader = MockUpload::new();
        uploader
            .expect_transfer()
            .times(4)
            .returning(|_| Err(TransferError::transient("NETWORK", "reset")));
        let worker = Worker::new(
            store.clone(),
            Arc::new(uploader),
            Arc::new(ProgressCounters::new(1, 0)),
        )
        .with_pacing(pacing());

        let started = Instant::now();
        assert_eq!(worker.process(pull_record()).await, RecordStatus::Fail);
        // 2s + 4s + 8s of backoff
        assert!(started.elapsed() >= Duration::from_secs(14));

        let stored = store.fetch_page(MigrateType::PullUpload, 0, 1).await.unwrap();
        assert_eq!(stored[0].retry_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_internal_deadline_stops_retries() {
        let store = store();
        let mut uploader = MockUpload::new();
        uploader
            .expect_transfer()
            .times(2)
            .returning(|_| Err(TransferError::transient("NETWORK", "reset")));
        let worker = Worker::new(
            store.clone(),
            Arc::new(uploader),
            Arc::new(ProgressCounters::new(1, 0)),
        )
        .with_pacing(Pacing {
            limiter: Arc::new(RateLimiter::new(5)),
            policy: RetryPolicy::default()
                .with_base_delay(Duration::from_secs(10))
                .with_internal_deadline(Duration::from_secs(15)),
        });

        assert_eq!(worker.process(pull_record()).await, RecordStatus::Fail);
        let stored = store.fetch_page(MigrateType::PullUpload, 0, 1).await.unwrap();
        assert_eq!(stored[0].error_code.as_deref(), Some(INTERNAL_TIMEOUT));
    }

    #[tokio::test]
    async fn test_unpaced_worker_calls_uploader_once() {
        let store = store();
        let mut uploader = MockUpload::new();
        uploader
            .expect_transfer()
            .times(1)
            .returning(|_| Err(TransferError::transient("NETWORK", "reset")));
        let worker = Worker::new(
            store.clone(),
            Arc::new(uploader),
            Arc::new(ProgressCounters::new(1, 0)),
        );

        let record = MigrationRecord::pending(MigrateType::Local, SourceItem::new("/a.mp4"));
        assert_eq!(worker.process(record).await, RecordStatus::Fail);
        assert_eq!(worker.progress().snapshot().fail, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_write_failure_is_contained() {
        let store = store();
        store.fail_writes(true);
        let worker = Worker::new(
            store.clone(),
            Arc::new(crate::testing::AlwaysSucceeds::default()),
            Arc::new(ProgressCounters::new(1, 0)),
        );

        let status = worker.process(pull_record()).await;

        assert_eq!(status, RecordStatus::Success);
        assert_eq!(store.upsert_calls(), FINAL_WRITE_ATTEMPTS);
        assert!(store.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_task_is_recorded() {
        let store = store();
        let worker = Worker::new(
            store.clone(),
            Arc::new(crate::testing::AlwaysSucceeds::default()),
            Arc::new(ProgressCounters::new(1, 0)),
        );

        let error = TransferError::timeout(crate::retry::THREAD_POOL_TIMEOUT, "task exceeded 70s");
        let status = worker
            .record_abandoned(pull_record(), error, Duration::from_secs(70))
            .await;

        assert_eq!(status, RecordStatus::Fail);
        let records = store.records();
        assert_eq!(records[0].error_code.as_deref(), Some("THREAD_POOL_TIMEOUT"));
        assert_eq!(records[0].duration_ms, Some(70_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_task_keeps_stored_success() {
        let store = store();
        let progress = Arc::new(ProgressCounters::new(1, 0));
        let worker = Worker::new(
            store.clone(),
            Arc::new(crate::testing::AlwaysSucceeds::default()),
            progress.clone(),
        );
        // The task finished its write right before the outer deadline fired
        assert_eq!(worker.process(pull_record()).await, RecordStatus::Success);

        let error = TransferError::timeout(crate::retry::THREAD_POOL_TIMEOUT, "task exceeded 70s");
        let status = worker
            .record_abandoned(pull_record(), error, Duration::from_secs(70))
            .await;

        assert_eq!(status, RecordStatus::Success);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].error_code, None);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.fail, 0);
    }

    #[test]
    fn test_progress_percent() {
        let progress = ProgressCounters::new(4, 1);
        progress.record(RecordStatus::Success);
        let snapshot = progress.record(RecordStatus::Fail);
        assert_eq!(snapshot.success, 2);
        assert_eq!(snapshot.fail, 1);
        assert_eq!(snapshot.percent(), 75.0);
        assert_eq!(ProgressCounters::new(0, 0).snapshot().percent(), 100.0);
    }
}
