//! Wires validated configuration to the migration engine

use anyhow::{Context, Result};
use bridge_traits::{HttpClient, MigrateType, ObjectReader, SourceEnumerator};
use core_migrate::{
    create_pool, DatabaseConfig, EngineOutcome, MediaFilter, MigrationController, MigrationEngine,
    Pacing, RateLimiter, ResultReporter, RetryPolicy, RunListEnumerator, SchedulerConfig,
    SqliteRecordStore, StoragePathPolicy, TaskScheduler, TwoPhaseUploader,
};
use core_runtime::config::{MigrateConfig, PullUploadConfig, SourceConfig};
use core_runtime::logging::redact_if_sensitive;
use provider_bucket::{BucketEndpoint, BucketSource};
use provider_local::{LocalFsEnumerator, UrlListEnumerator};
use provider_vod::{Credentials, PullOptions, PullUploader, ReqwestHttpClient, VodClient, VodTransport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Outer deadline for one direct-pull item, above the worker's own 60 s budget
const PULL_FORCED_TIMEOUT: Duration = Duration::from_secs(70);

async fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Cannot create directory {}", dir.display()))
}

async fn open_store(db_path: &Path) -> Result<Arc<SqliteRecordStore>> {
    if let Some(parent) = db_path.parent() {
        ensure_dir(parent).await?;
    }
    let pool = create_pool(DatabaseConfig::new(db_path))
        .await
        .with_context(|| format!("Cannot open record store {}", db_path.display()))?;
    let store = SqliteRecordStore::new(pool);
    store.initialize().await?;
    info!(path = %db_path.display(), "Record store ready");
    Ok(Arc::new(store))
}

fn http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(ReqwestHttpClient::new()?))
}

fn log_outcome(migrate_type: MigrateType, outcome: &EngineOutcome) {
    let progress = &outcome.run.progress;
    info!(
        migrate_type = %migrate_type,
        seeded = outcome.seed.seeded,
        resumed = outcome.seed.already_seeded,
        processed = outcome.run.processed,
        total = progress.total,
        success = progress.success,
        fail = progress.fail,
        elapsed_secs = outcome.run.elapsed.as_secs_f64(),
        "Migration finished"
    );
}

/// Resumable migration from a TOML configuration
#[instrument(skip_all, fields(config = %config_path.display()))]
pub async fn run_migrate(config_path: &Path) -> Result<()> {
    let config = MigrateConfig::load(config_path)?;
    info!(
        migrate_type = %config.migrate_type,
        secret_id = %redact_if_sensitive("secret_id", &config.common.secret_id),
        region = %config.common.region,
        concurrency = config.common.concurrency,
        "Configuration loaded"
    );

    let mut objects: Option<Arc<dyn ObjectReader>> = None;
    let (enumerator, filter): (Arc<dyn SourceEnumerator>, MediaFilter) = match &config.source {
        SourceConfig::Local(local) => (
            Arc::new(LocalFsEnumerator::new(&local.local_path)) as Arc<dyn SourceEnumerator>,
            MediaFilter::from_common(&config.common).with_excluded_dirs(local.excludes.clone()),
        ),
        SourceConfig::UrlList(list) => (
            Arc::new(UrlListEnumerator::new(&list.urllist_path)) as Arc<dyn SourceEnumerator>,
            MediaFilter::from_common(&config.common),
        ),
        SourceConfig::Bucket(bucket) => {
            let endpoint = BucketEndpoint::resolve(
                config.migrate_type,
                bucket.region.as_deref(),
                bucket.end_point.as_deref(),
            )?;
            info!(
                bucket = %bucket.bucket,
                region = %endpoint.region,
                endpoint = endpoint.endpoint_url.as_deref().unwrap_or("default"),
                "Bucket source resolved"
            );
            let source = Arc::new(BucketSource::new(
                &endpoint,
                &bucket.bucket,
                &bucket.access_key_id,
                &bucket.access_key_secret,
            ));
            objects = Some(source.clone() as Arc<dyn ObjectReader>);
            (source as Arc<dyn SourceEnumerator>, MediaFilter::from_common(&config.common))
        }
    };

    ensure_dir(&config.common.result_output_path).await?;
    let store = open_store(&config.db_path()).await?;

    let credentials = Credentials::new(&config.common.secret_id, &config.common.secret_key);
    let client = VodClient::new(http_client()?, credentials.clone(), &config.common.region);
    let mut transport = VodTransport::new(client, credentials, config.common.sub_app_id);
    if let Some(objects) = objects {
        transport = transport.with_object_reader(objects);
    }
    let uploader = TwoPhaseUploader::new(Arc::new(transport));

    let controller = MigrationController::new(store.clone(), enumerator, filter, config.migrate_type)
        .with_prefix(config.prefix());
    let scheduler = TaskScheduler::new(
        store.clone(),
        Arc::new(uploader),
        config.migrate_type,
        SchedulerConfig::default().with_concurrency(config.common.concurrency),
    )
    .with_reporter(ResultReporter::new(
        store.clone(),
        config.migrate_type,
        config.result_path(),
    ));

    let outcome = MigrationEngine::new(store, config.fingerprint.clone(), controller, scheduler)
        .run()
        .await?;
    log_outcome(config.migrate_type, &outcome);
    Ok(())
}

/// Direct-pull run from a run list and a JSON configuration
#[instrument(skip_all, fields(run_list = %run_list_path.display()))]
pub async fn run_pull(run_list_path: &Path, config_path: &Path) -> Result<()> {
    let run_list = tokio::fs::read(run_list_path)
        .await
        .with_context(|| format!("Run list {} cannot be read", run_list_path.display()))?;
    let config = PullUploadConfig::load(config_path, &run_list)?;
    info!(
        secret_id = %redact_if_sensitive("secret_id", &config.secret_id),
        region = %config.region,
        workers = config.workers,
        rate_limit = config.rate_limit,
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    let content = String::from_utf8(run_list).context("Run list is not valid UTF-8")?;
    let enumerator =
        RunListEnumerator::from_content(&content, &StoragePathPolicy::from_config(&config.custom_path))?;

    ensure_dir(&config.result_output_path).await?;
    let store = open_store(&config.db_path).await?;

    let credentials = Credentials::new(&config.secret_id, &config.secret_key);
    let client = VodClient::new(http_client()?, credentials, &config.region);
    let uploader = PullUploader::new(
        client,
        PullOptions {
            sub_app_id: config.sub_app_id,
            tasks_priority: config.tasks_priority,
            procedure: config.procedure.clone(),
        },
    );

    let pacing = Pacing {
        limiter: Arc::new(RateLimiter::new(config.rate_limit)),
        policy: RetryPolicy::default().with_max_retries(config.max_retries),
    };
    let reporter = ResultReporter::new(store.clone(), MigrateType::PullUpload, config.result_path())
        .with_summary_file(config.summary_path())
        .detailed(true);

    let controller = MigrationController::new(
        store.clone(),
        Arc::new(enumerator),
        MediaFilter::allow_all(),
        MigrateType::PullUpload,
    );
    let scheduler = TaskScheduler::new(
        store.clone(),
        Arc::new(uploader),
        MigrateType::PullUpload,
        SchedulerConfig::default()
            .with_concurrency(config.workers)
            .with_forced_timeout(PULL_FORCED_TIMEOUT),
    )
    .with_pacing(pacing)
    .with_reporter(reporter);

    let outcome = MigrationEngine::new(store, config.fingerprint.clone(), controller, scheduler)
        .run()
        .await?;
    log_outcome(MigrateType::PullUpload, &outcome);
    Ok(())
}
