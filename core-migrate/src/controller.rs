//! # Migration Controller
//!
//! Producer side of the migration: enumerates the source once per session and
//! seeds the store with pending records.
//!
//! ## Overview
//!
//! The controller only acts while the session is `Init`. It walks the
//! [`SourceEnumerator`] page by page, runs every item through the
//! [`MediaFilter`], and upserts the survivors as `Init` records. Skipped items
//! leave no trace in the store.
//!
//! A listing failure is retried with exponential backoff. When the attempts are
//! exhausted the run aborts with [`MigrateError::Enumeration`] and the session
//! stays `Init`, so the next invocation enumerates from scratch. Only a
//! completed enumeration moves the session to `Running`.

use crate::filter::MediaFilter;
use crate::record::MigrationRecord;
use crate::repository::RecordStore;
use crate::session::SessionStatus;
use crate::{MigrateError, Result};
use bridge_traits::{ListPage, MigrateType, SourceEnumerator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Listing attempts per page before the run aborts
const LISTING_ATTEMPTS: u32 = 3;

/// What one controller invocation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub seeded: u64,
    pub skipped: u64,
    pub pages: u32,
    /// The session had already left `Init`; nothing was enumerated
    pub already_seeded: bool,
}

/// Producer that seeds the record store from a source
pub struct MigrationController {
    store: Arc<dyn RecordStore>,
    enumerator: Arc<dyn SourceEnumerator>,
    filter: MediaFilter,
    migrate_type: MigrateType,
    prefix: String,
    backoff_base: Duration,
}

impl MigrationController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        enumerator: Arc<dyn SourceEnumerator>,
        filter: MediaFilter,
        migrate_type: MigrateType,
    ) -> Self {
        Self {
            store,
            enumerator,
            filter,
            migrate_type,
            prefix: String::new(),
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Listing prefix passed to the enumerator
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Base of the `base * 2^attempt` listing backoff
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Enumerate and seed, unless the session is already past `Init`
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Enumeration`] when listing keeps failing, or a
    /// store error. The session is left `Init` in both cases.
    #[instrument(skip(self), fields(migrate_type = %self.migrate_type))]
    pub async fn run(&self) -> Result<SeedSummary> {
        let status = self.store.get_session_status().await?;
        if status != SessionStatus::Init {
            info!(status = %status, "Source already enumerated, resuming");
            return Ok(SeedSummary {
                already_seeded: true,
                ..SeedSummary::default()
            });
        }

        let mut summary = SeedSummary::default();
        let mut marker: Option<String> = None;

        loop {
            let page = self.list_with_retry(marker.as_deref()).await?;
            summary.pages += 1;

            for item in page.items {
                let verdict = self.filter.check(&item.key);
                if !verdict.is_accepted() {
                    debug!(key = %item.key, verdict = ?verdict, "Skipping item");
                    summary.skipped += 1;
                    continue;
                }
                self.store
                    .upsert(&MigrationRecord::pending(self.migrate_type, item))
                    .await?;
                summary.seeded += 1;
            }

            match page.next_marker {
                Some(next) if !page.is_done => marker = Some(next),
                _ => break,
            }
        }

        let running = status.transition(SessionStatus::Running)?;
        self.store.set_session_status(running).await?;

        info!(
            seeded = summary.seeded,
            skipped = summary.skipped,
            pages = summary.pages,
            "Source enumeration complete"
        );
        Ok(summary)
    }

    async fn list_with_retry(&self, marker: Option<&str>) -> Result<ListPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.enumerator.list_items(&self.prefix, marker).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < LISTING_ATTEMPTS => {
                    let delay = self.backoff_base * 2u32.pow(attempt);
                    warn!(attempt, marker, error = %e, delay_secs = delay.as_secs_f64(), "Listing failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(MigrateError::Enumeration {
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}
