//! # Task Scheduler
//!
//! Consumer loop draining unfinished records through a bounded worker pool.
//!
//! ## Overview
//!
//! ```text
//! run_start = now()                       (once per invocation)
//! loop:
//!     sleep(poll_interval)
//!     page = fetch_unfinished(type, run_start, page_size)
//!     if page is empty: break
//!     spawn one supervised worker per record; wait for the whole page
//! session -> Finished; write report
//! ```
//!
//! `run_start` is fixed once, so a record written during this invocation
//! (for example a failed one) is never fetched again by the same invocation.
//! Failed records are retried by the next invocation, which computes a new
//! `run_start`.
//!
//! ## Forced timeout
//!
//! With a forced timeout configured, each worker runs as its own task and the
//! supervisor stops waiting once the timeout elapses. The task is aborted, so
//! it is cancelled at its next await point. A request already sent to the
//! remote service is not recalled. The record is written as failed with
//! `THREAD_POOL_TIMEOUT`. A worker task that panics is written as failed with
//! `TASK_EXECUTION_ERROR`.

use crate::record::{current_timestamp_micros, MigrationRecord, RecordStatus};
use crate::reporter::{ReportSummary, ResultReporter};
use crate::repository::RecordStore;
use crate::retry::{TASK_EXECUTION_ERROR, THREAD_POOL_TIMEOUT};
use crate::session::SessionStatus;
use crate::task_group::TaskGroup;
use crate::worker::{Pacing, ProgressCounters, ProgressSnapshot, Worker};
use crate::{MigrateError, Result};
use bridge_traits::{MigrateType, TransferError, Uploader};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker pool size
    pub concurrency: usize,
    /// Records fetched per page
    pub page_size: u32,
    /// Pause before each page fetch
    pub poll_interval: Duration,
    /// Outer deadline per record, enforced by abandoning the worker task
    pub forced_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            page_size: 1000,
            poll_interval: Duration::from_secs(1),
            forced_timeout: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_forced_timeout(mut self, timeout: Duration) -> Self {
        self.forced_timeout = Some(timeout);
        self
    }
}

/// Outcome of one scheduler run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub progress: ProgressSnapshot,
    /// Records handed to workers by this invocation
    pub processed: u64,
    pub elapsed: Duration,
    /// `None` when no reporter is attached or reporting failed
    pub report: Option<ReportSummary>,
}

/// Consumer side of the migration
pub struct TaskScheduler {
    store: Arc<dyn RecordStore>,
    uploader: Arc<dyn Uploader>,
    migrate_type: MigrateType,
    config: SchedulerConfig,
    pacing: Option<Pacing>,
    reporter: Option<ResultReporter>,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        uploader: Arc<dyn Uploader>,
        migrate_type: MigrateType,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            uploader,
            migrate_type,
            config,
            pacing: None,
            reporter: None,
        }
    }

    /// Rate limit and retry every transfer
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Write the result artifacts once the loop has drained
    pub fn with_reporter(mut self, reporter: ResultReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Drain every unfinished record, then finalize the session
    ///
    /// # Errors
    ///
    /// Returns an error if the session is still `Init` or the store fails.
    /// Per-record failures never surface here.
    #[instrument(skip(self), fields(migrate_type = %self.migrate_type))]
    pub async fn run(&self) -> Result<RunSummary> {
        let status = self.store.get_session_status().await?;
        if !status.is_seeded() {
            return Err(MigrateError::InvalidStateTransition {
                from: status.as_str().to_string(),
                to: "draining".to_string(),
                reason: "records have not been seeded yet".to_string(),
            });
        }

        let total = self.store.count_by_type(self.migrate_type).await?;
        let succeeded = self
            .store
            .count_by_status(self.migrate_type, RecordStatus::Success)
            .await?;
        let progress = Arc::new(ProgressCounters::new(total, succeeded));

        let mut worker = Worker::new(self.store.clone(), self.uploader.clone(), progress.clone());
        if let Some(pacing) = &self.pacing {
            worker = worker.with_pacing(pacing.clone());
        }

        let run_start = current_timestamp_micros();
        let started = Instant::now();
        let mut processed = 0u64;
        info!(
            total,
            succeeded,
            concurrency = self.config.concurrency,
            "Starting to drain unfinished records"
        );

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let page = self
                .store
                .fetch_unfinished(self.migrate_type, run_start, self.config.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            debug!(records = page.len(), "Dispatching page");
            processed += page.len() as u64;

            let mut group = TaskGroup::new(self.config.concurrency);
            for record in page {
                group.spawn(supervise(
                    worker.clone(),
                    record,
                    self.config.forced_timeout,
                ));
            }
            group.wait().await;
        }

        let finished = status.transition(SessionStatus::Finished)?;
        self.store.set_session_status(finished).await?;

        let elapsed = started.elapsed();
        let report = match &self.reporter {
            Some(reporter) => match reporter.report(elapsed).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    error!(error = %e, "Failed to write migration report");
                    None
                }
            },
            None => None,
        };

        let progress = progress.snapshot();
        info!(
            processed,
            success = progress.success,
            fail = progress.fail,
            elapsed_secs = elapsed.as_secs_f64(),
            "Migration finished"
        );

        Ok(RunSummary {
            progress,
            processed,
            elapsed,
            report,
        })
    }
}

/// Run one record's worker as its own task and record abandoned outcomes
async fn supervise(worker: Worker, record: MigrationRecord, forced_timeout: Option<Duration>) {
    let started = Instant::now();
    let mut task = tokio::spawn({
        let worker = worker.clone();
        let record = record.clone();
        async move {
            worker.process(record).await;
        }
    });

    let joined = match forced_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                let error = TransferError::timeout(
                    THREAD_POOL_TIMEOUT,
                    format!("task exceeded {}s", limit.as_secs()),
                );
                worker
                    .record_abandoned(record, error, started.elapsed())
                    .await;
                return;
            }
        },
        None => (&mut task).await,
    };

    if let Err(e) = joined {
        let error = TransferError::permanent(TASK_EXECUTION_ERROR, e.to_string());
        worker
            .record_abandoned(record, error, started.elapsed())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AlwaysSucceeds, MemoryRecordStore};
    use async_trait::async_trait;
    use bridge_traits::{SourceItem, SourceRef, TransferOutcome, TransferResult};

    async fn seeded(keys: &[&str]) -> Arc<MemoryRecordStore> {
        let store = Arc::new(MemoryRecordStore::new());
        for key in keys {
            store
                .upsert(&MigrationRecord::pending(MigrateType::Local, SourceItem::new(*key)))
                .await
                .unwrap();
        }
        store.init_session("fp").await.unwrap();
        store.set_session_status(SessionStatus::Running).await.unwrap();
        store
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
            .with_concurrency(2)
            .with_page_size(2)
            .with_poll_interval(Duration::from_millis(10))
    }

    /// Fails every key containing "bad"; stalls forever on keys containing "stuck"
    struct SelectiveUploader;

    #[async_trait]
    impl Uploader for SelectiveUploader {
        async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome> {
            let key = source.display_key();
            if key.contains("stuck") {
                std::future::pending::<()>().await;
            }
            if key.contains("panic") {
                panic!("uploader bug");
            }
            if key.contains("bad") {
                return Err(TransferError::transient("NETWORK", "reset"));
            }
            Ok(TransferOutcome {
                destination_id: key.to_string(),
                destination_url: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_every_record_across_pages() {
        let store = seeded(&["/a.mp4", "/b.mp4", "/c.mp4", "/d.mp4", "/e.mp4"]).await;
        let uploader = Arc::new(AlwaysSucceeds::default());
        let scheduler = TaskScheduler::new(store.clone(), uploader.clone(), MigrateType::Local, config());

        let summary = scheduler.run().await.unwrap();

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.progress.success, 5);
        assert_eq!(uploader.calls(), 5);
        assert!(store.records().iter().all(|r| r.status == RecordStatus::Success));
        assert_eq!(
            store.get_session_status().await.unwrap(),
            SessionStatus::Finished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_records_are_not_refetched_in_same_run() {
        let store = seeded(&["/bad1.mp4", "/ok.mp4", "/bad2.mp4"]).await;
        let scheduler = TaskScheduler::new(
            store.clone(),
            Arc::new(SelectiveUploader),
            MigrateType::Local,
            config(),
        );

        let summary = scheduler.run().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.progress.fail, 2);

        // A second invocation retries the failures only
        let summary = scheduler.run().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.progress.success, 1);
        assert_eq!(
            store.get_session_status().await.unwrap(),
            SessionStatus::Finished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_unseeded_session() {
        let store = Arc::new(MemoryRecordStore::new());
        let scheduler = TaskScheduler::new(
            store,
            Arc::new(AlwaysSucceeds::default()),
            MigrateType::Local,
            config(),
        );

        assert!(matches!(
            scheduler.run().await,
            Err(MigrateError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_timeout_records_failure() {
        let store = seeded(&["/stuck.mp4", "/ok.mp4"]).await;
        let scheduler = TaskScheduler::new(
            store.clone(),
            Arc::new(SelectiveUploader),
            MigrateType::Local,
            config().with_forced_timeout(Duration::from_secs(70)),
        );

        let summary = scheduler.run().await.unwrap();
        assert_eq!(summary.progress.success, 1);
        assert_eq!(summary.progress.fail, 1);

        let stuck = store
            .records()
            .into_iter()
            .find(|r| r.key == "/stuck.mp4")
            .unwrap();
        assert_eq!(stuck.status, RecordStatus::Fail);
        assert_eq!(stuck.error_code.as_deref(), Some(THREAD_POOL_TIMEOUT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_worker_is_recorded() {
        let store = seeded(&["/panic.mp4", "/ok.mp4"]).await;
        let scheduler = TaskScheduler::new(
            store.clone(),
            Arc::new(SelectiveUploader),
            MigrateType::Local,
            config(),
        );

        let summary = scheduler.run().await.unwrap();
        assert_eq!(summary.progress.fail, 1);
        let panicked = store
            .records()
            .into_iter()
            .find(|r| r.key == "/panic.mp4")
            .unwrap();
        assert_eq!(panicked.error_code.as_deref(), Some(TASK_EXECUTION_ERROR));
    }
}
