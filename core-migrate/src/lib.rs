//! # Resumable Migration Engine
//!
//! Moves an enumerable set of media items to the destination platform while
//! tracking every item durably, so an interrupted run resumes without redoing
//! finished work.
//!
//! ## Overview
//!
//! ```text
//! MigrationController ──seed──→ RecordStore ←──update── Worker pool
//!        (once)                     │                       ↑
//!                                   └──fetch page──→ TaskScheduler ──→ ResultReporter
//! ```
//!
//! ## Components
//!
//! - **Records** (`record`): Per-item state keyed by `(migrate_type, key)`
//! - **Session** (`session`): Run lifecycle with validated transitions
//! - **Record Store** (`repository`): SQLite persistence for records and the session
//! - **Controller** (`controller`): Enumerates the source and seeds pending records
//! - **Filter** (`filter`): Media classification and exclusion rules
//! - **Scheduler** (`scheduler`): Drains unfinished records page by page
//! - **Worker** (`worker`): One item's transfer, retries and final write
//! - **Rate Limiter** (`rate_limiter`): Fixed-window admission control
//! - **Retry** (`retry`): Retry decisions for both transport shapes
//! - **Two-phase Uploader** (`uploader`): Apply / put / commit driver
//! - **Reporter** (`reporter`): Result file and run summary
//! - **Run List** (`runlist`): Source enumeration for the direct-pull variant
//! - **Engine** (`engine`): Startup orchestration

pub mod controller;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod rate_limiter;
pub mod record;
pub mod reporter;
pub mod repository;
pub mod retry;
pub mod runlist;
pub mod scheduler;
pub mod session;
pub mod task_group;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{MigrateError, Result};

pub use controller::{MigrationController, SeedSummary};
pub use db::{create_pool, DatabaseConfig};
pub use engine::{EngineOutcome, MigrationEngine};
pub use filter::{FilterVerdict, MediaFilter};
pub use rate_limiter::RateLimiter;
pub use record::{MigrationRecord, RecordStatus};
pub use reporter::{ReportSummary, ResultReporter};
pub use repository::{RecordStore, SqliteRecordStore};
pub use retry::{RetryPolicy, TwoPhaseRetry};
pub use runlist::{RunListEnumerator, StoragePathPolicy};
pub use scheduler::{RunSummary, SchedulerConfig, TaskScheduler};
pub use session::SessionStatus;
pub use uploader::TwoPhaseUploader;
pub use worker::{Pacing, ProgressCounters, Worker};
