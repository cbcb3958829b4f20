//! # Migration Configuration
//!
//! Typed, validated configuration for the two migration modes.
//!
//! ## Overview
//!
//! - [`MigrateConfig`] is read from a TOML file and drives the resumable
//!   migration of a local directory, a URL list, or a bucket.
//! - [`PullUploadConfig`] is read from a JSON file and drives the direct-pull
//!   variant fed by a run list.
//!
//! Both are validated completely when they are built. Missing sections, empty
//! credentials and out-of-range values fail here, before any database is
//! opened. Each configuration also carries a SHA-256 fingerprint of the bytes
//! it was built from. The engine stores it with the session and refuses to
//! resume a run under a different fingerprint.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::MigrateConfig;
//!
//! let config = MigrateConfig::load("config.toml")?;
//! println!("{} -> {}", config.migrate_type, config.db_path().display());
//! ```

use crate::error::{Error, Result};
use bridge_traits::MigrateType;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Upper bound for `common.concurrency`
pub const MAX_CONCURRENCY: usize = 50;

/// File name of the record store inside `migrateDbStoragePath`
pub const MIGRATE_DB_FILE: &str = "migrate.db";

/// File name of the JSON-lines result inside `migrateResultOutputPath`
pub const MIGRATE_RESULT_FILE: &str = "vod_migrate_result.txt";

/// File name of the JSON run summary written by direct-pull runs
pub const MIGRATE_SUMMARY_FILE: &str = "vod_migrate_summary.json";

/// Media classes an item extension can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Video,
    Audio,
    Image,
}

impl MediaClass {
    pub const ALL: [MediaClass; 3] = [MediaClass::Video, MediaClass::Audio, MediaClass::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Video => "video",
            MediaClass::Audio => "audio",
            MediaClass::Image => "image",
        }
    }
}

impl FromStr for MediaClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(MediaClass::Video),
            "audio" => Ok(MediaClass::Audio),
            "image" => Ok(MediaClass::Image),
            _ => Err(Error::Config(format!("Unknown media classification: {}", s))),
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lowercase hex SHA-256 over the concatenation of `parts`
pub fn fingerprint(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

// ============================================================================
// Resumable migration (TOML)
// ============================================================================

/// Settings shared by every source type (`[common]`)
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    pub sub_app_id: u64,
    pub concurrency: usize,
    pub support_media_classification: Vec<MediaClass>,
    pub exclude_media_type: Vec<String>,
    pub db_storage_path: PathBuf,
    pub result_output_path: PathBuf,
}

/// Local directory source (`[migrateLocal]`)
#[derive(Debug, Clone)]
pub struct LocalSourceConfig {
    pub local_path: PathBuf,
    pub excludes: Vec<PathBuf>,
}

/// URL list source (`[migrateUrl]`)
#[derive(Debug, Clone)]
pub struct UrlListSourceConfig {
    pub urllist_path: PathBuf,
}

/// Object-storage bucket source (`[migrateCos]`, `[migrateAws]`, `[migrateAli]`, `[migrateQiniu]`)
#[derive(Debug, Clone)]
pub struct BucketSourceConfig {
    pub region: Option<String>,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub end_point: Option<String>,
    pub prefix: String,
}

/// Source-specific settings for the selected migrate type
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Local(LocalSourceConfig),
    UrlList(UrlListSourceConfig),
    Bucket(BucketSourceConfig),
}

/// Validated configuration of a resumable migration run
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub migrate_type: MigrateType,
    pub common: CommonConfig,
    pub source: SourceConfig,
    /// SHA-256 of the configuration file bytes
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct RawMigrateConfig {
    #[serde(rename = "migrateType")]
    migrate_type: Option<RawMigrateTypeSection>,
    common: Option<RawCommonSection>,
    #[serde(rename = "migrateLocal")]
    local: Option<RawLocalSection>,
    #[serde(rename = "migrateUrl")]
    url: Option<RawUrlSection>,
    #[serde(rename = "migrateCos")]
    cos: Option<RawBucketSection>,
    #[serde(rename = "migrateAws")]
    aws: Option<RawBucketSection>,
    #[serde(rename = "migrateAli")]
    ali: Option<RawBucketSection>,
    #[serde(rename = "migrateQiniu")]
    qiniu: Option<RawBucketSection>,
}

#[derive(Debug, Deserialize)]
struct RawMigrateTypeSection {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommonSection {
    secret_id: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
    sub_app_id: Option<u64>,
    concurrency: Option<i64>,
    support_media_classification: Option<Vec<String>>,
    exclude_media_type: Option<Vec<String>>,
    migrate_db_storage_path: Option<PathBuf>,
    migrate_result_output_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocalSection {
    local_path: Option<PathBuf>,
    #[serde(default)]
    excludes: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUrlSection {
    urllist_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBucketSection {
    region: Option<String>,
    bucket: Option<String>,
    secret_id: Option<String>,
    secret_key: Option<String>,
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    end_point: Option<String>,
    #[serde(default)]
    prefix: String,
}

impl MigrateConfig {
    /// Read and validate a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or fails validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| Error::Config(format!("{} is not valid UTF-8", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content
    ///
    /// Relative paths are resolved against the current working directory.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawMigrateConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot resolve working directory: {}", e)))?;

        let migrate_type = raw
            .migrate_type
            .and_then(|section| section.kind)
            .ok_or_else(|| Error::Config("Invalid config: migrateType".to_string()))?
            .parse::<MigrateType>()
            .map_err(|e| Error::Config(e.to_string()))?;
        let common = Self::validate_common(
            raw.common
                .ok_or_else(|| Error::Config("Invalid config: common".to_string()))?,
            &cwd,
        )?;

        let source = match migrate_type {
            MigrateType::Local => {
                let section = raw
                    .local
                    .ok_or_else(|| missing_section(migrate_type))?;
                let local_path = section
                    .local_path
                    .ok_or_else(|| missing_item("migrateLocal", "localPath"))?;
                SourceConfig::Local(LocalSourceConfig {
                    local_path: absolutize(&cwd, local_path),
                    excludes: section
                        .excludes
                        .into_iter()
                        .map(|p| absolutize(&cwd, p))
                        .collect(),
                })
            }
            MigrateType::Url => {
                let section = raw.url.ok_or_else(|| missing_section(migrate_type))?;
                let urllist_path = section
                    .urllist_path
                    .ok_or_else(|| missing_item("migrateUrl", "urllistPath"))?;
                SourceConfig::UrlList(UrlListSourceConfig {
                    urllist_path: absolutize(&cwd, urllist_path),
                })
            }
            MigrateType::Cos => Self::validate_bucket(migrate_type, raw.cos)?,
            MigrateType::Aws => Self::validate_bucket(migrate_type, raw.aws)?,
            MigrateType::Ali => Self::validate_bucket(migrate_type, raw.ali)?,
            MigrateType::Qiniu => Self::validate_bucket(migrate_type, raw.qiniu)?,
            MigrateType::PullUpload => {
                return Err(Error::Config(
                    "pullUpload runs are configured through the pull command".to_string(),
                ))
            }
        };

        Ok(Self {
            migrate_type,
            common,
            source,
            fingerprint: fingerprint(&[content.as_bytes()]),
        })
    }

    fn validate_common(raw: RawCommonSection, cwd: &Path) -> Result<CommonConfig> {
        let secret_id = required(raw.secret_id, "common", "secretId")?;
        let secret_key = required(raw.secret_key, "common", "secretKey")?;
        let region = required(raw.region, "common", "region")?;

        let concurrency = raw
            .concurrency
            .ok_or_else(|| missing_item("common", "concurrency"))?;
        if concurrency < 1 || concurrency > MAX_CONCURRENCY as i64 {
            return Err(Error::Config(format!(
                "legal concurrency is [1, {}], got {}",
                MAX_CONCURRENCY, concurrency
            )));
        }

        let support_media_classification = match raw.support_media_classification {
            Some(values) => {
                let mut classes = Vec::with_capacity(values.len());
                for value in values {
                    let class = value.parse::<MediaClass>()?;
                    if !classes.contains(&class) {
                        classes.push(class);
                    }
                }
                classes
            }
            None => MediaClass::ALL.to_vec(),
        };

        let exclude_media_type = raw
            .exclude_media_type
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().trim_start_matches('.').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(CommonConfig {
            secret_id,
            secret_key,
            region,
            sub_app_id: raw.sub_app_id.unwrap_or(0),
            concurrency: concurrency as usize,
            support_media_classification,
            exclude_media_type,
            db_storage_path: absolutize(
                cwd,
                raw.migrate_db_storage_path.unwrap_or_else(|| PathBuf::from(".")),
            ),
            result_output_path: absolutize(
                cwd,
                raw.migrate_result_output_path
                    .unwrap_or_else(|| PathBuf::from(".")),
            ),
        })
    }

    fn validate_bucket(
        migrate_type: MigrateType,
        section: Option<RawBucketSection>,
    ) -> Result<SourceConfig> {
        let name = migrate_type.as_str();
        let section = section.ok_or_else(|| missing_section(migrate_type))?;

        let (access_key_id, access_key_secret) = if migrate_type == MigrateType::Cos {
            (
                required(section.secret_id, name, "secretId")?,
                required(section.secret_key, name, "secretKey")?,
            )
        } else {
            (
                required(section.access_key_id, name, "accessKeyId")?,
                required(section.access_key_secret, name, "accessKeySecret")?,
            )
        };

        let (region, end_point) = match migrate_type {
            MigrateType::Cos | MigrateType::Aws => {
                (Some(required(section.region, name, "region")?), None)
            }
            _ => (
                section.region.filter(|region| !region.trim().is_empty()),
                Some(required(section.end_point, name, "endPoint")?),
            ),
        };

        Ok(SourceConfig::Bucket(BucketSourceConfig {
            region,
            bucket: required(section.bucket, name, "bucket")?,
            access_key_id,
            access_key_secret,
            end_point,
            prefix: section.prefix,
        }))
    }

    /// Listing prefix handed to the source enumerator
    pub fn prefix(&self) -> &str {
        match &self.source {
            SourceConfig::Bucket(bucket) => &bucket.prefix,
            _ => "",
        }
    }

    /// Location of the SQLite record store
    pub fn db_path(&self) -> PathBuf {
        self.common.db_storage_path.join(MIGRATE_DB_FILE)
    }

    /// Location of the JSON-lines result file
    pub fn result_path(&self) -> PathBuf {
        self.common.result_output_path.join(MIGRATE_RESULT_FILE)
    }
}

// ============================================================================
// Direct pull (JSON)
// ============================================================================

/// Storage path rules for pulled media (`custom_path`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomPathConfig {
    #[serde(default)]
    pub use_url_path: bool,
    #[serde(default)]
    pub prefix: String,
}

/// Validated configuration of a direct-pull run
#[derive(Debug, Clone)]
pub struct PullUploadConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    pub sub_app_id: u64,
    pub tasks_priority: Option<i64>,
    pub procedure: Option<String>,
    pub custom_path: CustomPathConfig,
    /// Worker pool size
    pub workers: usize,
    /// Admitted requests per second
    pub rate_limit: u32,
    pub max_retries: u32,
    pub db_path: PathBuf,
    pub result_output_path: PathBuf,
    /// SHA-256 of the configuration bytes followed by the run-list bytes
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct RawPullUploadConfig {
    secret_id: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
    subappid: Option<serde_json::Value>,
    tasks_priority: Option<serde_json::Value>,
    procedure: Option<String>,
    #[serde(default)]
    custom_path: CustomPathConfig,
    workers: Option<usize>,
    rate_limit: Option<u32>,
    max_retries: Option<u32>,
    db_path: Option<PathBuf>,
    result_output_path: Option<PathBuf>,
}

impl PullUploadConfig {
    pub const DEFAULT_WORKERS: usize = 10;
    pub const DEFAULT_RATE_LIMIT: u32 = 5;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_DB_FILE: &'static str = "pull_upload.db";

    /// Read and validate a JSON configuration file
    ///
    /// `run_list` is mixed into the fingerprint so a resumed run also detects
    /// an edited run list.
    pub fn load(path: impl AsRef<Path>, run_list: &[u8]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Config(format!(
                "Configuration file {} cannot be read: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_slice(&bytes, run_list)
    }

    pub fn from_json_slice(bytes: &[u8], run_list: &[u8]) -> Result<Self> {
        let raw: RawPullUploadConfig = serde_json::from_slice(bytes)
            .map_err(|e| Error::Config(format!("Invalid configuration file format - {}", e)))?;

        let mut invalid = Vec::new();
        for (key, value) in [
            ("secret_id", &raw.secret_id),
            ("secret_key", &raw.secret_key),
            ("region", &raw.region),
        ] {
            if value.as_deref().map(str::trim).unwrap_or("").is_empty() {
                invalid.push(key);
            }
        }
        let sub_app_id = raw.subappid.as_ref().and_then(json_to_u64);
        if sub_app_id.is_none() {
            invalid.push("subappid");
        }
        if !invalid.is_empty() {
            return Err(Error::Config(format!(
                "Configuration items missing or empty: {}",
                invalid.join(", ")
            )));
        }

        let tasks_priority = match raw.tasks_priority {
            Some(value) => match json_to_i64(&value) {
                Some(priority) => Some(priority),
                None => {
                    warn!(tasks_priority = %value, "Invalid tasks_priority format, must be integer, skipping");
                    None
                }
            },
            None => None,
        };

        let workers = raw.workers.unwrap_or(Self::DEFAULT_WORKERS);
        if workers == 0 || workers > MAX_CONCURRENCY {
            return Err(Error::Config(format!(
                "workers must be within [1, {}], got {}",
                MAX_CONCURRENCY, workers
            )));
        }
        let rate_limit = raw.rate_limit.unwrap_or(Self::DEFAULT_RATE_LIMIT);
        if rate_limit == 0 {
            return Err(Error::Config("rate_limit must be positive".to_string()));
        }

        Ok(Self {
            secret_id: raw.secret_id.unwrap_or_default().trim().to_string(),
            secret_key: raw.secret_key.unwrap_or_default().trim().to_string(),
            region: raw.region.unwrap_or_default().trim().to_string(),
            sub_app_id: sub_app_id.unwrap_or(0),
            tasks_priority,
            procedure: raw
                .procedure
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            custom_path: raw.custom_path,
            workers,
            rate_limit,
            max_retries: raw.max_retries.unwrap_or(Self::DEFAULT_MAX_RETRIES),
            db_path: raw
                .db_path
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DB_FILE)),
            result_output_path: raw
                .result_output_path
                .unwrap_or_else(|| PathBuf::from(".")),
            fingerprint: fingerprint(&[bytes, run_list]),
        })
    }

    pub fn result_path(&self) -> PathBuf {
        self.result_output_path.join(MIGRATE_RESULT_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.result_output_path.join(MIGRATE_SUMMARY_FILE)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn absolutize(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

fn required(value: Option<String>, section: &str, item: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(missing_item(section, item)),
    }
}

fn missing_item(section: &str, item: &str) -> Error {
    Error::Config(format!(
        "item: {}, not found in section: {}",
        item, section
    ))
}

fn missing_section(migrate_type: MigrateType) -> Error {
    Error::Config(format!("Invalid config: {}", migrate_type))
}

fn json_to_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_to_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
