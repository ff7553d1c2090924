//! Upload-job persistence (`upload_jobs` table).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::postgrest::PostgrestClient;

const TABLE: &str = "upload_jobs";

/// Upload job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// One ingestion of one file for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadJob {
    pub job_id: String,
    pub task_id: String,
    /// `primary` or `reference`.
    pub role: String,
    pub filename: String,
    pub status: JobStatus,
    pub stage: String,
    pub progress: u8,
    pub error_message: Option<String>,
    pub storage_key: String,
    pub result_meta: Option<Value>,
    pub our_party: String,
    pub language: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for UploadJob {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            task_id: String::new(),
            role: String::new(),
            filename: String::new(),
            status: JobStatus::Queued,
            stage: "uploaded".to_string(),
            progress: 0,
            error_message: None,
            storage_key: String::new(),
            result_meta: None,
            our_party: String::new(),
            language: String::new(),
            created_at: None,
            updated_at: None,
            started_at: None,
            finished_at: None,
        }
    }
}

enum Backend {
    Memory(Mutex<HashMap<String, UploadJob>>),
    Postgrest(PostgrestClient),
}

/// CRUD helper around the upload-jobs table.
pub struct UploadJobStore {
    backend: Backend,
}

impl UploadJobStore {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    pub fn postgrest(client: PostgrestClient) -> Self {
        Self {
            backend: Backend::Postgrest(client),
        }
    }

    /// PostgREST when the environment is configured, memory otherwise.
    pub fn from_env() -> Arc<Self> {
        match PostgrestClient::from_env() {
            Some(client) => Arc::new(Self::postgrest(client)),
            None => {
                warn!("upload_jobs using in-memory fallback store");
                Arc::new(Self::memory())
            }
        }
    }

    pub async fn create_job(
        &self,
        task_id: &str,
        role: &str,
        filename: &str,
        storage_key: &str,
        our_party: &str,
        language: &str,
    ) -> StoreResult<UploadJob> {
        let now = Utc::now();
        let job = UploadJob {
            job_id: format!("job_{}", Uuid::new_v4().simple()),
            task_id: task_id.to_string(),
            role: role.to_string(),
            filename: filename.to_string(),
            storage_key: storage_key.to_string(),
            our_party: our_party.to_string(),
            language: language.to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        match &self.backend {
            Backend::Memory(map) => {
                map.lock().await.insert(job.job_id.clone(), job.clone());
            }
            Backend::Postgrest(client) => {
                client
                    .upsert(TABLE, "job_id", &serde_json::to_value(&job)?)
                    .await?;
            }
        }
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> StoreResult<Option<UploadJob>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.lock().await.get(job_id).cloned()),
            Backend::Postgrest(client) => {
                let rows = client.select_eq(TABLE, "job_id", job_id, None).await?;
                match rows.into_iter().next() {
                    Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Jobs of one task ordered by creation time.
    pub async fn jobs_by_task(&self, task_id: &str) -> StoreResult<Vec<UploadJob>> {
        match &self.backend {
            Backend::Memory(map) => {
                let map = map.lock().await;
                let mut jobs: Vec<UploadJob> = map
                    .values()
                    .filter(|job| job.task_id == task_id)
                    .cloned()
                    .collect();
                jobs.sort_by_key(|job| job.created_at);
                Ok(jobs)
            }
            Backend::Postgrest(client) => {
                let rows = client
                    .select_eq(TABLE, "task_id", task_id, Some("created_at.asc"))
                    .await?;
                rows.into_iter()
                    .map(|raw| Ok(serde_json::from_value(raw)?))
                    .collect()
            }
        }
    }

    /// Queued or running jobs, i.e. work to reschedule after a restart.
    pub async fn recoverable_jobs(&self) -> StoreResult<Vec<UploadJob>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map
                .lock()
                .await
                .values()
                .filter(|job| matches!(job.status, JobStatus::Queued | JobStatus::Running))
                .cloned()
                .collect()),
            Backend::Postgrest(client) => {
                let rows = client.select_in(TABLE, "status", &["queued", "running"]).await?;
                rows.into_iter()
                    .map(|raw| Ok(serde_json::from_value(raw)?))
                    .collect()
            }
        }
    }

    pub async fn mark_running(&self, job_id: &str) -> StoreResult<()> {
        let now = Utc::now();
        let current = self.require(job_id).await?;
        let patch = json!({
            "status": JobStatus::Running,
            "stage": if current.stage == "uploaded" { "loading" } else { current.stage.as_str() },
            "updated_at": now,
            "started_at": current.started_at.unwrap_or(now),
        });
        self.apply_patch(job_id, patch).await
    }

    /// Resets a failed job for retry. Rejected for every other status.
    pub async fn mark_queued(&self, job_id: &str) -> StoreResult<()> {
        let current = self.require(job_id).await?;
        if current.status != JobStatus::Failed {
            return Err(StoreError::InvalidTransition {
                kind: "upload job",
                id: job_id.to_string(),
                reason: format!("retry requires status=failed, found {:?}", current.status),
            });
        }
        self.apply_patch(
            job_id,
            json!({
                "status": JobStatus::Queued,
                "stage": "uploaded",
                "progress": 0,
                "error_message": Value::Null,
                "result_meta": Value::Null,
                "updated_at": Utc::now(),
                "started_at": Value::Null,
                "finished_at": Value::Null,
            }),
        )
        .await
    }

    pub async fn update_stage(&self, job_id: &str, stage: &str, progress: i64) -> StoreResult<()> {
        self.apply_patch(
            job_id,
            json!({
                "status": JobStatus::Running,
                "stage": stage,
                "progress": progress.clamp(0, 100),
                "updated_at": Utc::now(),
            }),
        )
        .await
    }

    pub async fn mark_succeeded(&self, job_id: &str, result_meta: Value) -> StoreResult<()> {
        let now = Utc::now();
        self.apply_patch(
            job_id,
            json!({
                "status": JobStatus::Succeeded,
                "stage": "finished",
                "progress": 100,
                "result_meta": result_meta,
                "error_message": Value::Null,
                "updated_at": now,
                "finished_at": now,
            }),
        )
        .await
    }

    pub async fn mark_failed(&self, job_id: &str, error_message: &str) -> StoreResult<()> {
        let now = Utc::now();
        let clipped: String = error_message.chars().take(2000).collect();
        self.apply_patch(
            job_id,
            json!({
                "status": JobStatus::Failed,
                "stage": "failed",
                "error_message": clipped,
                "updated_at": now,
                "finished_at": now,
            }),
        )
        .await
    }

    async fn require(&self, job_id: &str) -> StoreResult<UploadJob> {
        self.get_job(job_id).await?.ok_or_else(|| StoreError::NotFound {
            kind: "upload job",
            id: job_id.to_string(),
        })
    }

    async fn apply_patch(&self, job_id: &str, patch: Value) -> StoreResult<()> {
        match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.lock().await;
                let Some(job) = map.get(job_id).cloned() else {
                    return Err(StoreError::NotFound {
                        kind: "upload job",
                        id: job_id.to_string(),
                    });
                };
                let mut value = serde_json::to_value(&job)?;
                if let (Some(obj), Some(patch_obj)) = (value.as_object_mut(), patch.as_object()) {
                    for (key, val) in patch_obj {
                        obj.insert(key.clone(), val.clone());
                    }
                }
                map.insert(job_id.to_string(), serde_json::from_value(value)?);
                Ok(())
            }
            Backend::Postgrest(client) => client.update_eq(TABLE, "job_id", job_id, &patch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn store_with_job() -> (UploadJobStore, String) {
        let store = UploadJobStore::memory();
        let job = store
            .create_job("t1", "primary", "contract.txt", "uploads/t1/contract.txt", "", "en")
            .await
            .unwrap();
        (store, job.job_id)
    }

    #[tokio::test]
    async fn create_starts_queued_at_zero() {
        let (store, job_id) = store_with_job().await;
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, "uploaded");
        assert_eq!(job.progress, 0);
        assert!(job.job_id.starts_with("job_"));
    }

    #[tokio::test]
    async fn happy_lifecycle_reaches_finished() {
        let (store, job_id) = store_with_job().await;
        store.mark_running(&job_id).await.unwrap();
        store.update_stage(&job_id, "parsing", 60).await.unwrap();
        store
            .mark_succeeded(&job_id, json!({"document_id": "doc-1"}))
            .await
            .unwrap();
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.stage, "finished");
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_meta.unwrap()["document_id"], "doc-1");
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn retry_gate_only_from_failed() {
        let (store, job_id) = store_with_job().await;
        // Queued job cannot be retried.
        assert!(matches!(
            store.mark_queued(&job_id).await.unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));

        store.mark_failed(&job_id, "parser exploded").await.unwrap();
        store.mark_queued(&job_id).await.unwrap();
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, "uploaded");
        assert_eq!(job.progress, 0);
        assert!(job.error_message.is_none());
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[tokio::test]
    async fn progress_is_clamped() {
        let (store, job_id) = store_with_job().await;
        store.update_stage(&job_id, "parsing", 250).await.unwrap();
        assert_eq!(store.get_job(&job_id).await.unwrap().unwrap().progress, 100);
        store.update_stage(&job_id, "parsing", -5).await.unwrap();
        assert_eq!(store.get_job(&job_id).await.unwrap().unwrap().progress, 0);
    }

    #[tokio::test]
    async fn started_at_set_once() {
        let (store, job_id) = store_with_job().await;
        store.mark_running(&job_id).await.unwrap();
        let first = store.get_job(&job_id).await.unwrap().unwrap().started_at;
        store.mark_running(&job_id).await.unwrap();
        let second = store.get_job(&job_id).await.unwrap().unwrap().started_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn recoverable_jobs_are_queued_or_running() {
        let (store, job_id) = store_with_job().await;
        assert_eq!(store.recoverable_jobs().await.unwrap().len(), 1);
        store.mark_failed(&job_id, "boom").await.unwrap();
        assert!(store.recoverable_jobs().await.unwrap().is_empty());
    }
}
