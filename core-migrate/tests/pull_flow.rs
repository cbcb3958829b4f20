//! Direct-pull runs: run list in, paced single-call uploader out

use async_trait::async_trait;
use bridge_traits::{
    MigrateType, SourceRef, TransferError, TransferOutcome, TransferResult, Uploader,
};
use core_migrate::{
    DatabaseConfig, MediaFilter, MigrationController, MigrationEngine, Pacing, RateLimiter,
    RecordStatus, RecordStore, RetryPolicy, RunListEnumerator, SchedulerConfig, SqliteRecordStore,
    StoragePathPolicy, TaskScheduler,
};
use mockall::mock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mock! {
    Puller {}

    #[async_trait]
    impl Uploader for Puller {
        async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome>;
    }
}

/// Fails the first `failures` calls transiently, then succeeds
struct FlakyPuller {
    failures: u32,
    calls: Mutex<Vec<SourceRef>>,
}

#[async_trait]
impl Uploader for FlakyPuller {
    async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(source.clone());
        if calls.len() as u32 <= self.failures {
            return Err(TransferError::transient("InternalError", "service busy"));
        }
        Ok(TransferOutcome {
            destination_id: "task-1".to_string(),
            destination_url: None,
        })
    }
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy::default().with_base_delay(Duration::from_millis(10))
}

async fn store() -> Arc<SqliteRecordStore> {
    let pool = core_migrate::create_pool(DatabaseConfig::in_memory())
        .await
        .unwrap();
    let store = SqliteRecordStore::new(pool);
    store.initialize().await.unwrap();
    Arc::new(store)
}

fn engine(
    store: Arc<SqliteRecordStore>,
    run_list: &str,
    uploader: Arc<dyn Uploader>,
    policy: RetryPolicy,
) -> MigrationEngine {
    let enumerator =
        RunListEnumerator::from_content(run_list, &StoragePathPolicy::new(false, "")).unwrap();
    let controller = MigrationController::new(
        store.clone(),
        Arc::new(enumerator),
        MediaFilter::allow_all(),
        MigrateType::PullUpload,
    );
    let pacing = Pacing {
        limiter: Arc::new(RateLimiter::new(50)),
        policy,
    };
    let scheduler = TaskScheduler::new(
        store.clone(),
        uploader,
        MigrateType::PullUpload,
        SchedulerConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_forced_timeout(Duration::from_secs(70)),
    )
    .with_pacing(pacing);
    MigrationEngine::new(store, "pull-fp", controller, scheduler)
}

#[tokio::test]
async fn test_run_list_collapses_duplicates_and_skips_malformed() {
    let store = store().await;
    let run_list = "not-a-url/clip.mp4\n\
                    https://cdn.example.com/clip.mp4,Clip,4,/movies/clip.mp4\n\
                    https://cdn.example.com/clip.mp4,Clip,4,/movies/clip.mp4\n";
    let mut puller = MockPuller::new();
    puller.expect_transfer().times(1).returning(|_| {
        Ok(TransferOutcome {
            destination_id: "task-9".to_string(),
            destination_url: None,
        })
    });

    let outcome = engine(store.clone(), run_list, Arc::new(puller), fast_retries())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.seed.seeded, 2);
    assert_eq!(store.count_by_type(MigrateType::PullUpload).await.unwrap(), 1);

    let records = store.fetch_page(MigrateType::PullUpload, 0, 10).await.unwrap();
    let attrs = records[0].attributes.clone().unwrap();
    assert_eq!(attrs.media_name.as_deref(), Some("Clip"));
    assert_eq!(attrs.class_id, Some(4));
    assert_eq!(attrs.storage_path.as_deref(), Some("/movies/clip.mp4"));
    assert_eq!(records[0].destination_id.as_deref(), Some("task-9"));
}

#[tokio::test]
async fn test_transient_failures_then_success_records_retries() {
    let store = store().await;
    let puller = Arc::new(FlakyPuller {
        failures: 2,
        calls: Mutex::new(Vec::new()),
    });

    engine(
        store.clone(),
        "https://cdn.example.com/a.mp4\n",
        puller.clone(),
        fast_retries(),
    )
    .run()
    .await
    .unwrap();

    let records = store.fetch_page(MigrateType::PullUpload, 0, 10).await.unwrap();
    assert_eq!(records[0].status, RecordStatus::Success);
    assert_eq!(records[0].retry_count, 2);
    assert_eq!(puller.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_attempted_once() {
    let store = store().await;
    let mut puller = MockPuller::new();
    puller.expect_transfer().times(1).returning(|_| {
        Err(TransferError::permanent("InvalidParameterValue.MediaUrl", "bad media url")
            .with_request_id("req-1"))
    });

    let started = Instant::now();
    engine(
        store.clone(),
        "https://cdn.example.com/a.mp4\n",
        Arc::new(puller),
        RetryPolicy::default(),
    )
    .run()
    .await
    .unwrap();

    let records = store.fetch_page(MigrateType::PullUpload, 0, 10).await.unwrap();
    assert_eq!(records[0].status, RecordStatus::Fail);
    assert_eq!(records[0].retry_count, 0);
    assert!(records[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("bad media url"));
    // No backoff sleep (the first would be a full second)
    assert!(started.elapsed() < Duration::from_secs(1));
}
