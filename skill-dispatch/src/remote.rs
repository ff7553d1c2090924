//! Remote workflow backend: submit a run, poll until it settles.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::SkillError;

/// Connection settings for the workflow service.
#[derive(Debug, Clone)]
pub struct WorkflowClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

impl Default for WorkflowClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.refly.ai".to_string(),
            api_key: String::new(),
            timeout_secs: 120,
            poll_interval_secs: 2,
            max_poll_attempts: 60,
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    run_id: String,
}

#[derive(Deserialize)]
struct RunStatus {
    status: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Thin client over the workflow HTTP API.
pub struct WorkflowClient {
    cfg: WorkflowClientConfig,
    http: Client,
}

impl WorkflowClient {
    pub fn new(cfg: WorkflowClientConfig) -> Result<Self, SkillError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { cfg, http })
    }

    /// Starts a workflow run and returns its id.
    pub async fn submit(&self, workflow_id: &str, input: &Value) -> Result<String, SkillError> {
        let url = format!(
            "{}/v1/workflows/{}/runs",
            self.cfg.base_url.trim_end_matches('/'),
            workflow_id
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.api_key)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?
            .error_for_status()?;
        let body: SubmitResponse = resp.json().await?;
        debug!(workflow_id, run_id = %body.run_id, "workflow run submitted");
        Ok(body.run_id)
    }

    /// Polls a run until it completes, fails, or the attempt budget is spent.
    pub async fn poll(&self, run_id: &str) -> Result<Value, SkillError> {
        let url = format!("{}/v1/runs/{}", self.cfg.base_url.trim_end_matches('/'), run_id);
        for _ in 0..self.cfg.max_poll_attempts {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.cfg.api_key)
                .send()
                .await?
                .error_for_status()?;
            let status: RunStatus = resp.json().await?;
            match status.status.as_str() {
                "completed" | "succeeded" => {
                    return Ok(status.result.unwrap_or(Value::Null));
                }
                "failed" => {
                    return Err(SkillError::Workflow(
                        status.error.unwrap_or_else(|| "workflow run failed".to_string()),
                    ));
                }
                _ => {
                    tokio::time::sleep(std::time::Duration::from_secs(
                        self.cfg.poll_interval_secs,
                    ))
                    .await;
                }
            }
        }
        Err(SkillError::WorkflowTimeout(run_id.to_string()))
    }
}
