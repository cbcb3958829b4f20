//! In-memory collaborators for unit tests.
//!
//! Timing tests run on paused tokio time, which does not mix with the SQLite
//! worker thread. These fakes keep those tests free of real I/O.

use crate::record::{current_timestamp_micros, MigrationRecord, RecordStatus};
use crate::repository::RecordStore;
use crate::session::SessionStatus;
use crate::{MigrateError, Result};
use async_trait::async_trait;
use bridge_traits::{
    BridgeError, ListPage, MigrateType, SourceEnumerator, SourceItem, SourceRef, TransferOutcome,
    TransferResult, Uploader,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    records: Vec<MigrationRecord>,
    sessions: Vec<(SessionStatus, String)>,
}

/// [`RecordStore`] backed by a vector
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    upserts: AtomicU32,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following upsert fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<MigrationRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn session_rows(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert(&self, record: &MigrationRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MigrateError::Store("disk I/O error".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        let mut stored = record.clone();
        stored.updated_at = current_timestamp_micros();
        let next_id = state.records.len() as i64 + 1;
        match state
            .records
            .iter_mut()
            .find(|r| r.migrate_type == record.migrate_type && r.key == record.key)
        {
            Some(existing) => {
                stored.id = existing.id;
                stored.created_at = existing.created_at;
                *existing = stored;
            }
            None => {
                stored.id = Some(next_id);
                state.records.push(stored);
            }
        }
        Ok(())
    }

    async fn upsert_unless_success(&self, record: &MigrationRecord) -> Result<bool> {
        let kept = self.state.lock().unwrap().records.iter().any(|r| {
            r.migrate_type == record.migrate_type
                && r.key == record.key
                && r.status == RecordStatus::Success
        });
        if kept {
            return Ok(false);
        }
        self.upsert(record).await.map(|()| true)
    }

    async fn fetch_unfinished(
        &self,
        migrate_type: MigrateType,
        older_than: i64,
        limit: u32,
    ) -> Result<Vec<MigrationRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.migrate_type == migrate_type
                    && r.status != RecordStatus::Success
                    && r.updated_at < older_than
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_page(
        &self,
        migrate_type: MigrateType,
        page_index: u32,
        page_size: u32,
    ) -> Result<Vec<MigrationRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.migrate_type == migrate_type)
            .skip(page_index as usize * page_size as usize)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn get_session_status(&self) -> Result<SessionStatus> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .last()
            .map(|(status, _)| *status)
            .unwrap_or(SessionStatus::Init))
    }

    async fn set_session_status(&self, status: SessionStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.sessions.last_mut() {
            Some(latest) => latest.0 = status,
            None => state.sessions.push((status, String::new())),
        }
        Ok(())
    }

    async fn init_session(&self, fingerprint: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .push((SessionStatus::Init, fingerprint.to_string()));
        Ok(())
    }

    async fn session_fingerprint(&self) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.sessions.last().map(|(_, fp)| fp.clone()))
    }

    async fn reset_all(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.records.clear();
        state.sessions.clear();
        Ok(())
    }

    async fn count_by_type(&self, migrate_type: MigrateType) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.migrate_type == migrate_type)
            .count() as u64)
    }

    async fn count_by_status(
        &self,
        migrate_type: MigrateType,
        status: RecordStatus,
    ) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.migrate_type == migrate_type && r.status == status)
            .count() as u64)
    }
}

/// Enumerator serving fixed pages, optionally failing the first calls
pub struct StaticEnumerator {
    pages: Vec<Vec<SourceItem>>,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl StaticEnumerator {
    pub fn new(pages: Vec<Vec<SourceItem>>) -> Self {
        Self {
            pages,
            failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_first(self, failures: u32) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceEnumerator for StaticEnumerator {
    async fn list_items(
        &self,
        _prefix: &str,
        marker: Option<&str>,
    ) -> bridge_traits::error::Result<ListPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BridgeError::OperationFailed("listing refused".to_string()));
        }

        let index: usize = marker.and_then(|m| m.parse().ok()).unwrap_or(0);
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let is_done = index + 1 >= self.pages.len();
        Ok(ListPage {
            items,
            next_marker: (!is_done).then(|| (index + 1).to_string()),
            is_done,
        })
    }
}

/// Uploader that always succeeds and counts calls
#[derive(Debug, Default)]
pub struct AlwaysSucceeds {
    calls: AtomicU32,
}

impl AlwaysSucceeds {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for AlwaysSucceeds {
    async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransferOutcome {
            destination_id: format!("file-{}", n),
            destination_url: Some(format!("https://vod.example.com/{}", source.display_key())),
        })
    }
}
