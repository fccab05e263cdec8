//! In-memory result store for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use sbomer_core::error::StorageError;
use sbomer_core::pipeline::ResultStore;
use sbomer_core::types::{BatchStats, OperationLogEntry, SbomRecord, StoredSbom};

#[derive(Default)]
struct Inner {
    sboms: HashMap<i64, StoredSbom>,
    logs: Vec<OperationLogEntry>,
    stats: Vec<BatchStats>,
    upserts: usize,
}

/// Same upsert and append semantics as the PostgreSQL store.
#[derive(Default)]
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Audit entries for one project, in append order.
    pub fn logs_for(&self, project_id: i64) -> Vec<OperationLogEntry> {
        self.lock()
            .logs
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn batch_stats(&self) -> Vec<BatchStats> {
        self.lock().stats.clone()
    }

    pub fn sbom_count(&self) -> usize {
        self.lock().sboms.len()
    }

    /// Number of `upsert_sbom` calls, including overwrites.
    pub fn upsert_count(&self) -> usize {
        self.lock().upserts
    }
}

impl ResultStore for MemoryResultStore {
    async fn upsert_sbom(&self, record: &SbomRecord) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.upserts += 1;
        inner
            .sboms
            .entry(record.project_uid)
            .and_modify(|stored| {
                stored.record = record.clone();
                stored.updated_at = now;
            })
            .or_insert_with(|| StoredSbom {
                record: record.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn append_log(&self, entry: &OperationLogEntry) -> Result<(), StorageError> {
        self.lock().logs.push(entry.clone());
        Ok(())
    }

    async fn append_batch_stats(&self, stats: &BatchStats) -> Result<i64, StorageError> {
        let mut inner = self.lock();
        inner.stats.push(stats.clone());
        Ok(i64::try_from(inner.stats.len()).unwrap_or(i64::MAX))
    }

    async fn get_sbom(&self, project_uid: i64) -> Result<Option<StoredSbom>, StorageError> {
        Ok(self.lock().sboms.get(&project_uid).cloned())
    }
}
