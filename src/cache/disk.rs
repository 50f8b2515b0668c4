use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::{ApplyFn, JobRecord, StepStore};
use crate::errors::StepError;

/// On-disk envelope for one job: the step map plus its absolute expiry as a
/// Unix timestamp, refreshed on every write.
#[derive(Debug, Serialize, Deserialize)]
struct JobEnvelope {
    expires_at: i64,
    steps: JobRecord,
}

impl JobEnvelope {
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// Step store persisting one JSON file per job under a data directory, so
/// cached results survive process restarts.
///
/// Writes go to a `.tmp` file first, then rename into place. A corrupted job
/// file is backed up to `.bak` and treated as absent rather than failing the
/// request. Per-job file access is serialized through a lock keyed by job id.
pub struct JsonStepStore {
    data_dir: PathBuf,
    ttl: Duration,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonStepStore {
    pub async fn new(data_dir: PathBuf, ttl: Duration) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;
        Ok(Self {
            data_dir,
            ttl,
            locks: RwLock::new(HashMap::new()),
        })
    }

    fn job_path(&self, job_id: &str) -> Result<PathBuf, StepError> {
        // job ids become file names; refuse anything that could escape the
        // data directory
        if job_id.is_empty()
            || job_id.contains('/')
            || job_id.contains('\\')
            || job_id.contains("..")
        {
            return Err(StepError::Validation(format!(
                "Invalid job id: '{}'",
                job_id
            )));
        }
        Ok(self.data_dir.join(format!("{}.json", job_id)))
    }

    async fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(job_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(job_id.to_string()).or_default().clone()
    }

    /// Load the envelope for a job; corrupted files are backed up and read
    /// as absent. Callers must hold the job lock.
    async fn load(&self, job_id: &str) -> Result<Option<JobEnvelope>, StepError> {
        let path = self.job_path(job_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<JobEnvelope>(&content) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                tracing::warn!(
                    "Job file for '{}' is corrupted ({}), creating backup and treating as absent",
                    job_id,
                    e
                );
                let backup_path = path.with_extension("json.bak");
                if let Err(backup_err) = tokio::fs::copy(&path, &backup_path).await {
                    tracing::error!(
                        "Failed to back up corrupted job file for '{}': {}",
                        job_id,
                        backup_err
                    );
                }
                Ok(None)
            }
        }
    }

    /// Load only a live (unexpired) record; an expired file is removed.
    async fn load_live(&self, job_id: &str) -> Result<Option<JobRecord>, StepError> {
        match self.load(job_id).await? {
            Some(envelope) if envelope.is_expired() => {
                self.remove_file(job_id).await?;
                Ok(None)
            }
            Some(envelope) => Ok(Some(envelope.steps)),
            None => Ok(None),
        }
    }

    async fn persist(&self, job_id: &str, record: &JobRecord) -> Result<(), StepError> {
        let path = self.job_path(job_id)?;
        let envelope = JobEnvelope {
            expires_at: Utc::now().timestamp() + self.ttl.as_secs() as i64,
            steps: record.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn remove_file(&self, job_id: &str) -> Result<(), StepError> {
        let path = self.job_path(job_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StepStore for JsonStepStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StepError> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;
        self.load_live(job_id).await
    }

    async fn exists(&self, job_id: &str) -> Result<bool, StepError> {
        Ok(self.get(job_id).await?.is_some())
    }

    async fn delete(&self, job_id: &str) -> Result<(), StepError> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;
        tracing::info!("Deleting job '{}' from cache", job_id);
        self.remove_file(job_id).await
    }

    async fn read_modify_write(
        &self,
        job_id: &str,
        apply: ApplyFn,
    ) -> Result<JobRecord, StepError> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let mut record = self.load_live(job_id).await?.unwrap_or_default();
        apply(&mut record)?;

        self.persist(job_id, &record).await?;
        tracing::debug!("Committed {} step(s) for job '{}'", record.len(), job_id);
        Ok(record)
    }

    async fn purge_expired(&self) -> Result<usize, StepError> {
        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        let mut job_ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                job_ids.push(stem.to_string());
            }
        }

        let mut purged = 0;
        for job_id in job_ids {
            let lock = self.job_lock(&job_id).await;
            let _guard = lock.lock().await;
            if let Some(envelope) = self.load(&job_id).await? {
                if envelope.is_expired() {
                    self.remove_file(&job_id).await?;
                    purged += 1;
                }
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepRecord;
    use tempfile::TempDir;
    use uuid::Uuid;

    const TTL: Duration = Duration::from_secs(3600);

    fn record(job_id: &str) -> StepRecord {
        StepRecord {
            uuid: Uuid::new_v4(),
            job_id: job_id.to_string(),
            name: "step".to_string(),
            classname: "case".to_string(),
            position: Some(1),
            class_position: Some(1),
            result: Some("passed".to_string()),
            duration: None,
            data: None,
            test_data: None,
            number: 0,
            added_step: None,
        }
    }

    async fn setup_store() -> (JsonStepStore, TempDir) {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let store = JsonStepStore::new(tmp_dir.path().to_path_buf(), TTL)
            .await
            .expect("create store");
        (store, tmp_dir)
    }

    async fn put_one(store: &JsonStepStore, job_id: &str) -> Uuid {
        let step = record(job_id);
        let uuid = step.uuid;
        store
            .read_modify_write(
                job_id,
                Box::new(move |job| {
                    job.insert(step);
                    Ok(())
                }),
            )
            .await
            .expect("write");
        uuid
    }

    #[tokio::test]
    async fn test_get_returns_committed_record() {
        let (store, _tmp) = setup_store().await;
        let uuid = put_one(&store, "job-1").await;
        let job = store.get("job-1").await.expect("get").expect("present");
        assert!(job.step(&uuid).is_some());
    }

    #[tokio::test]
    async fn test_get_unknown_job_is_none() {
        let (store, _tmp) = setup_store().await;
        assert!(store.get("nope").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;
        store.delete("job-1").await.expect("delete");
        assert!(store.get("job-1").await.expect("get").is_none());
        assert!(!tmp.path().join("job-1.json").exists());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let uuid = {
            let store = JsonStepStore::new(tmp_dir.path().to_path_buf(), TTL)
                .await
                .expect("create store");
            put_one(&store, "job-1").await
        };

        let store = JsonStepStore::new(tmp_dir.path().to_path_buf(), TTL)
            .await
            .expect("create store");
        let job = store.get("job-1").await.expect("get").expect("present");
        assert!(job.step(&uuid).is_some());
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_after_write() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;
        assert!(!tmp.path().join("job-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_envelope_is_valid_json_with_expiry() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;

        let content = tokio::fs::read_to_string(tmp.path().join("job-1.json"))
            .await
            .expect("read file");
        let envelope: serde_json::Value = serde_json::from_str(&content).expect("parse");
        assert!(envelope["expires_at"].is_i64());
        assert!(envelope["steps"].is_object());

        let expires_at = envelope["expires_at"].as_i64().expect("i64");
        let expected = Utc::now().timestamp() + TTL.as_secs() as i64;
        assert!((expires_at - expected).abs() <= 2);
    }

    #[tokio::test]
    async fn test_corrupted_file_backed_up_and_treated_as_absent() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let job_file = tmp_dir.path().join("job-1.json");
        let corrupted = b"this is not valid JSON{{{";
        tokio::fs::write(&job_file, corrupted)
            .await
            .expect("write corrupted file");

        let store = JsonStepStore::new(tmp_dir.path().to_path_buf(), TTL)
            .await
            .expect("create store");
        assert!(store.get("job-1").await.expect("get").is_none());

        let backup = tokio::fs::read(tmp_dir.path().join("job-1.json.bak"))
            .await
            .expect("backup exists");
        assert_eq!(backup, corrupted);

        // the job is usable again after recovery
        put_one(&store, "job-1").await;
        assert!(store.get("job-1").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_expired_envelope_read_as_absent() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;

        // rewrite the envelope with a deadline in the past
        let path = tmp.path().join("job-1.json");
        let content = tokio::fs::read_to_string(&path).await.expect("read");
        let mut envelope: serde_json::Value = serde_json::from_str(&content).expect("parse");
        envelope["expires_at"] = serde_json::json!(Utc::now().timestamp() - 10);
        tokio::fs::write(&path, envelope.to_string())
            .await
            .expect("write");

        assert!(store.get("job-1").await.expect("get").is_none());
        assert!(!path.exists(), "expired file is reclaimed on read");
    }

    #[tokio::test]
    async fn test_write_resets_expiry() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;

        let path = tmp.path().join("job-1.json");
        let first: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(&path).await.expect("read"),
        )
        .expect("parse");

        // age the envelope, then write again; the deadline must move forward
        let mut aged = first.clone();
        aged["expires_at"] = serde_json::json!(Utc::now().timestamp() + 5);
        tokio::fs::write(&path, aged.to_string()).await.expect("write");

        put_one(&store, "job-1").await;
        let second: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(&path).await.expect("read"),
        )
        .expect("parse");
        let refreshed = second["expires_at"].as_i64().expect("i64");
        assert!(refreshed > Utc::now().timestamp() + 5);
    }

    #[tokio::test]
    async fn test_failed_apply_commits_nothing() {
        let (store, _tmp) = setup_store().await;
        let uuid = put_one(&store, "job-1").await;

        let result = store
            .read_modify_write(
                "job-1",
                Box::new(|job| {
                    job.insert(record("job-1"));
                    Err(StepError::Validation("abort".to_string()))
                }),
            )
            .await;
        assert!(result.is_err());

        let job = store.get("job-1").await.expect("get").expect("present");
        assert_eq!(job.len(), 1);
        assert!(job.step(&uuid).is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_stale_jobs() {
        let (store, tmp) = setup_store().await;
        put_one(&store, "job-1").await;
        put_one(&store, "job-2").await;

        let path = tmp.path().join("job-1.json");
        let content = tokio::fs::read_to_string(&path).await.expect("read");
        let mut envelope: serde_json::Value = serde_json::from_str(&content).expect("parse");
        envelope["expires_at"] = serde_json::json!(Utc::now().timestamp() - 10);
        tokio::fs::write(&path, envelope.to_string())
            .await
            .expect("write");

        let purged = store.purge_expired().await.expect("purge");
        assert_eq!(purged, 1);
        assert!(!path.exists());
        assert!(store.get("job-2").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_path_traversal_job_id_rejected() {
        let (store, _tmp) = setup_store().await;
        for bad in ["../evil", "a/b", "a\\b", ""] {
            let result = store.get(bad).await;
            match result {
                Err(StepError::Validation(_)) => {}
                other => panic!("Expected Validation for {:?}, got: {:?}", bad, other),
            }
        }
    }
}
