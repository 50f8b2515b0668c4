pub mod disk;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StepError;
use crate::models::StepRecord;

/// All cached steps for one job, keyed by step UUID. Expires as a whole; a
/// job never partially expires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRecord {
    steps: HashMap<Uuid, StepRecord>,
}

impl JobRecord {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, uuid: &Uuid) -> Option<&StepRecord> {
        self.steps.get(uuid)
    }

    pub fn step_mut(&mut self, uuid: &Uuid) -> Option<&mut StepRecord> {
        self.steps.get_mut(uuid)
    }

    pub fn insert(&mut self, record: StepRecord) {
        self.steps.insert(record.uuid, record);
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.values()
    }
}

/// Mutation applied under the per-job exclusive lock. Commits only on `Ok`.
pub type ApplyFn = Box<dyn FnOnce(&mut JobRecord) -> Result<(), StepError> + Send>;

/// Keyed, TTL-bounded store of job records.
///
/// `read_modify_write` is the only mutation path; a get-then-put sequence
/// from a caller would race with concurrent writers. Implementations must
/// serialize mutations per job id without blocking unrelated jobs, and must
/// reset the sliding TTL on every committed write.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Live record for the job, or `None` once expired.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StepError>;

    async fn exists(&self, job_id: &str) -> Result<bool, StepError>;

    async fn delete(&self, job_id: &str) -> Result<(), StepError>;

    /// Run `apply` against the current (or empty) JobRecord under the job's
    /// exclusive lock. On `Ok` the result is persisted with a fresh TTL and
    /// returned; on `Err` nothing is written and the error propagates. The
    /// lock is released either way.
    async fn read_modify_write(
        &self,
        job_id: &str,
        apply: ApplyFn,
    ) -> Result<JobRecord, StepError>;

    /// Reclaim storage held by expired jobs. Returns how many were dropped.
    async fn purge_expired(&self) -> Result<usize, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uuid: Uuid) -> StepRecord {
        StepRecord {
            uuid,
            job_id: "job-1".to_string(),
            name: "step".to_string(),
            classname: "case".to_string(),
            position: Some(1),
            class_position: Some(1),
            result: None,
            duration: None,
            data: None,
            test_data: None,
            number: 0,
            added_step: None,
        }
    }

    #[test]
    fn test_job_record_insert_and_lookup() {
        let mut job = JobRecord::default();
        assert!(job.is_empty());

        let uuid = Uuid::new_v4();
        job.insert(record(uuid));
        assert_eq!(job.len(), 1);
        assert!(job.step(&uuid).is_some());
        assert!(job.step(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_job_record_serializes_keyed_by_uuid() {
        let mut job = JobRecord::default();
        let uuid = Uuid::new_v4();
        job.insert(record(uuid));

        let json = serde_json::to_value(&job).expect("serialize");
        let obj = json.as_object().expect("object");
        assert!(obj.contains_key(&uuid.to_string()));

        let roundtrip: JobRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(roundtrip, job);
    }
}
