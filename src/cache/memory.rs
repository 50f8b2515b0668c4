use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::{ApplyFn, JobRecord, StepStore};
use crate::errors::StepError;

struct JobEntry {
    record: JobRecord,
    deadline: Instant,
}

impl JobEntry {
    fn is_expired(&self) -> bool {
        self.deadline <= Instant::now()
    }
}

type JobSlot = Arc<Mutex<Option<JobEntry>>>;

/// In-memory TTL-bounded step store.
///
/// Each job id maps to its own `Mutex`, so concurrent mutations of the same
/// job serialize while unrelated jobs proceed independently. The outer map
/// lock is held only long enough to clone the per-job Arc, never across a
/// record mutation.
pub struct MemoryStepStore {
    ttl: Duration,
    jobs: RwLock<HashMap<String, JobSlot>>,
}

impl MemoryStepStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, job_id: &str) -> Option<JobSlot> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn slot_or_insert(&self, job_id: &str) -> JobSlot {
        if let Some(slot) = self.jobs.read().await.get(job_id) {
            return slot.clone();
        }
        let mut jobs = self.jobs.write().await;
        jobs.entry(job_id.to_string()).or_default().clone()
    }

    /// Drop the map key for a cleared slot, but only while no other task
    /// holds a clone of its Arc (strong count 2 = the map's plus ours); a
    /// task that already cloned the Arc must still find its commit visible.
    async fn remove_if_unreferenced(&self, job_id: &str, slot: &JobSlot) {
        let mut jobs = self.jobs.write().await;
        if let Some(current) = jobs.get(job_id) {
            if Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2 {
                jobs.remove(job_id);
            }
        }
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StepError> {
        let Some(slot) = self.slot(job_id).await else {
            return Ok(None);
        };
        let mut entry = slot.lock().await;
        match entry.as_ref() {
            Some(live) if !live.is_expired() => Ok(Some(live.record.clone())),
            Some(_) => {
                // expired is as good as deleted
                *entry = None;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, job_id: &str) -> Result<bool, StepError> {
        let Some(slot) = self.slot(job_id).await else {
            return Ok(false);
        };
        let entry = slot.lock().await;
        Ok(entry.as_ref().is_some_and(|live| !live.is_expired()))
    }

    async fn delete(&self, job_id: &str) -> Result<(), StepError> {
        if let Some(slot) = self.slot(job_id).await {
            tracing::info!("Deleting job '{}' from cache", job_id);
            *slot.lock().await = None;
            self.remove_if_unreferenced(job_id, &slot).await;
        }
        Ok(())
    }

    async fn read_modify_write(
        &self,
        job_id: &str,
        apply: ApplyFn,
    ) -> Result<JobRecord, StepError> {
        let slot = self.slot_or_insert(job_id).await;
        let mut entry = slot.lock().await;

        let mut record = match entry.as_ref() {
            Some(live) if !live.is_expired() => live.record.clone(),
            _ => JobRecord::default(),
        };

        // nothing is committed unless the mutation succeeds
        apply(&mut record)?;

        *entry = Some(JobEntry {
            record: record.clone(),
            deadline: Instant::now() + self.ttl,
        });
        tracing::debug!("Committed {} step(s) for job '{}'", record.len(), job_id);
        Ok(record)
    }

    async fn purge_expired(&self) -> Result<usize, StepError> {
        let slots: Vec<(String, JobSlot)> = {
            let jobs = self.jobs.read().await;
            jobs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut purged = 0;
        for (job_id, slot) in slots {
            // a busy slot will be seen by the next sweep
            let Ok(mut entry) = slot.try_lock() else {
                continue;
            };
            if entry.as_ref().is_some_and(|live| live.is_expired()) {
                *entry = None;
                purged += 1;
            }
            let cleared = entry.is_none();
            drop(entry);
            if cleared {
                self.remove_if_unreferenced(&job_id, &slot).await;
            }
        }
        Ok(purged)
    }
}
