//! Step lifecycle orchestration: validation, position allocation, result
//! normalization, merge into storage, and reporter forwarding.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::{JobRecord, StepStore};
use crate::errors::StepError;
use crate::models::{
    validate_new_step, validate_step_update, JobOutcome, NewStep, StepRecord, StepResult,
    StepUpdate,
};
use crate::normalize::normalize_result;
use crate::position::allocate_position;
use crate::reporter::Reporter;

/// The only component with public step operations. Holds no record state of
/// its own; every operation re-reads through the store so concurrent writers
/// never act on stale data.
pub struct StepService {
    store: Arc<dyn StepStore>,
    reporter: Arc<dyn Reporter>,
}

impl StepService {
    pub fn new(store: Arc<dyn StepStore>, reporter: Arc<dyn Reporter>) -> Self {
        Self { store, reporter }
    }

    pub fn store(&self) -> &Arc<dyn StepStore> {
        &self.store
    }

    /// Create a batch of steps for a job. The whole batch is validated
    /// before anything is written and commits in one critical section;
    /// positions for discovered steps are allocated inside that section so
    /// concurrent creates cannot hand out the same pair.
    pub async fn create(
        &self,
        job_id: &str,
        steps: Vec<NewStep>,
    ) -> Result<Vec<StepRecord>, StepError> {
        for step in &steps {
            validate_new_step(step)?;
        }

        let uuids: Vec<Uuid> = steps.iter().map(|_| Uuid::new_v4()).collect();
        let prepared: Vec<(Uuid, NewStep)> = uuids.iter().copied().zip(steps).collect();
        let owner = job_id.to_string();

        let committed = self
            .store
            .read_modify_write(
                job_id,
                Box::new(move |job| {
                    for (uuid, step) in prepared {
                        let mut record = StepRecord {
                            uuid,
                            job_id: owner.clone(),
                            name: step.name.unwrap_or_default(),
                            classname: step.classname.unwrap_or_default(),
                            position: step.position,
                            class_position: step.class_position,
                            result: step.result,
                            duration: step.duration,
                            data: step.data,
                            test_data: step.test_data,
                            number: 0,
                            added_step: None,
                        };
                        if record.position.is_none() && record.class_position.is_none() {
                            let alloc = allocate_position(job, &owner, &record.classname)?;
                            record.position = Some(alloc.position);
                            record.class_position = Some(alloc.class_position);
                            record.added_step = Some(true);
                        }
                        job.insert(record);
                    }
                    Ok(())
                }),
            )
            .await?;

        let created = collect_batch(&committed, &uuids)?;
        tracing::debug!("Job '{}': created {} step(s)", job_id, created.len());
        if let Err(e) = self.reporter.notify_created(job_id, &created).await {
            tracing::error!(
                "Reporter notification failed for job '{}': {} (store state is authoritative)",
                job_id,
                e
            );
        }
        Ok(created)
    }

    pub async fn fetch(&self, job_id: &str, uuid: Uuid) -> Result<StepRecord, StepError> {
        self.store
            .get(job_id)
            .await?
            .and_then(|job| job.step(&uuid).cloned())
            .ok_or_else(|| StepError::NotFound("Requested step could not be found.".to_string()))
    }

    /// Update a batch of steps. Read-only fields and missing UUIDs reject
    /// eagerly; results are normalized before the critical section; unknown
    /// step UUIDs fail the whole batch with no counter advanced.
    pub async fn update(
        &self,
        job_id: &str,
        updates: Vec<StepUpdate>,
    ) -> Result<Vec<StepRecord>, StepError> {
        let mut prepared: Vec<(Uuid, StepUpdate)> = Vec::with_capacity(updates.len());
        for mut patch in updates {
            let uuid = validate_step_update(&patch)?;
            if let Some(raw) = patch.result.take() {
                let normalized = normalize_result(&raw, uuid)?;
                patch.result = Some(normalized.result.as_str().to_string());
                if let Some(status) = normalized.status {
                    patch
                        .data
                        .get_or_insert_with(Default::default)
                        .insert("status".to_string(), status.into());
                }
            }
            prepared.push((uuid, patch));
        }
        let uuids: Vec<Uuid> = prepared.iter().map(|(uuid, _)| *uuid).collect();

        let committed = self
            .store
            .read_modify_write(
                job_id,
                Box::new(move |job| {
                    let not_found: Vec<String> = prepared
                        .iter()
                        .filter(|(uuid, _)| job.step(uuid).is_none())
                        .map(|(uuid, _)| uuid.to_string())
                        .collect();
                    if !not_found.is_empty() {
                        return Err(StepError::NotFound(format!(
                            "Step(s) could not be found, UUIDs={}",
                            not_found.join(",")
                        )));
                    }

                    for (uuid, patch) in prepared {
                        if let Some(step) = job.step_mut(&uuid) {
                            step.number += 1;
                            step.apply_update(patch);
                        }
                    }
                    Ok(())
                }),
            )
            .await?;

        let updated = collect_batch(&committed, &uuids)?;
        tracing::debug!("Job '{}': updated {} step(s)", job_id, updated.len());
        if let Err(e) = self.reporter.notify_updated(job_id, &updated).await {
            tracing::error!(
                "Reporter notification failed for job '{}': {} (store state is authoritative)",
                job_id,
                e
            );
        }
        Ok(updated)
    }

    /// Aggregate outcome for a job: passed only when steps exist and every
    /// one of them is `passed` or `pending`. `blocked` and `created` count
    /// as failing, as do steps with no or non-canonical results.
    pub async fn aggregate_result(&self, job_id: &str) -> Result<JobOutcome, StepError> {
        let job = match self.store.get(job_id).await? {
            Some(job) if !job.is_empty() => job,
            _ => return Ok(JobOutcome::Failed),
        };

        let passed = job.steps().all(|step| {
            matches!(
                step.result.as_deref().and_then(StepResult::parse),
                Some(StepResult::Passed) | Some(StepResult::Pending)
            )
        });
        Ok(if passed {
            JobOutcome::Passed
        } else {
            JobOutcome::Failed
        })
    }

    /// Drop all cached steps for a job.
    pub async fn clear(&self, job_id: &str) -> Result<(), StepError> {
        self.store.delete(job_id).await
    }
}

fn collect_batch(job: &JobRecord, uuids: &[Uuid]) -> Result<Vec<StepRecord>, StepError> {
    uuids
        .iter()
        .map(|uuid| {
            job.step(uuid).cloned().ok_or_else(|| {
                StepError::StorageUnavailable(format!("Step {} missing after commit", uuid))
            })
        })
        .collect()
}
