//! # Migration Engine
//!
//! Startup orchestration tying the session, producer and consumer together.
//!
//! ## Flow
//!
//! 1. **Session**: a session still in `Init` means no enumeration ever
//!    completed. Leftover bookkeeping is discarded and a fresh session row
//!    carrying the configuration fingerprint is written. Any other status
//!    means a resumed run, which must present the stored fingerprint or the
//!    run aborts with [`MigrateError::SessionMismatch`].
//! 2. **Producer**: [`MigrationController::run`] seeds the store (no-op when
//!    resuming).
//! 3. **Consumer**: [`TaskScheduler::run`] drains unfinished records,
//!    finalizes the session and writes the report.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = MigrationEngine::new(store.clone(), config.fingerprint.clone(), controller, scheduler);
//! let outcome = engine.run().await?;
//! println!("{} migrated", outcome.run.progress.success);
//! ```

use crate::controller::{MigrationController, SeedSummary};
use crate::repository::RecordStore;
use crate::scheduler::{RunSummary, TaskScheduler};
use crate::session::SessionStatus;
use crate::{MigrateError, Result};
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a complete engine run
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub seed: SeedSummary,
    pub run: RunSummary,
}

/// Resumable migration engine
pub struct MigrationEngine {
    store: Arc<dyn RecordStore>,
    fingerprint: String,
    controller: MigrationController,
    scheduler: TaskScheduler,
}

impl MigrationEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fingerprint: impl Into<String>,
        controller: MigrationController,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            store,
            fingerprint: fingerprint.into(),
            controller,
            scheduler,
        }
    }

    /// Start a fresh session or validate the one being resumed
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::SessionMismatch`] when resuming under a
    /// different configuration, or a store error
    pub async fn prepare_session(&self) -> Result<SessionStatus> {
        let status = self.store.get_session_status().await?;

        if status == SessionStatus::Init {
            self.store.reset_all().await?;
            self.store.init_session(&self.fingerprint).await?;
            info!("Starting a new migration session");
            return Ok(status);
        }

        if !self.store.config_matches(&self.fingerprint).await? {
            let stored = self.store.session_fingerprint().await?.unwrap_or_default();
            return Err(MigrateError::SessionMismatch {
                stored,
                current: self.fingerprint.clone(),
            });
        }

        info!(status = %status, "Resuming migration session");
        Ok(status)
    }

    /// Prepare the session, seed the store, then drain it
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<EngineOutcome> {
        self.prepare_session().await?;
        let seed = self.controller.run().await?;
        let run = self.scheduler.run().await?;
        Ok(EngineOutcome { seed, run })
    }
}
