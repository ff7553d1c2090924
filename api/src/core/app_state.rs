//! Shared application state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use ai_llm_service::LlmClient;
use review_graph::GraphSettings;
use session_store::{SessionStore, UploadJobStore};
use skill_dispatch::{SkillDeps, SkillDispatcher, WorkflowClient, WorkflowClientConfig, generic_skills};

use crate::tasks::TaskRegistry;

/// Everything the handlers share. Construct once, wrap in `Arc`.
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub uploads: Arc<UploadJobStore>,
    pub llm: Option<Arc<LlmClient>>,
    pub dispatcher: Arc<SkillDispatcher>,
    pub settings: GraphSettings,
    pub tasks: Arc<TaskRegistry>,
    /// Local spool for uploaded files awaiting (re-)ingestion.
    pub spool_dir: PathBuf,
}

impl AppState {
    /// Builds state strictly from the environment. A missing or disabled
    /// LLM yields deterministic-mode reviews instead of an error.
    pub fn from_env() -> Self {
        let llm = match LlmClient::from_env() {
            Ok(client) => client.map(Arc::new),
            Err(err) => {
                warn!(%err, "LLM client unavailable, reviews run in deterministic mode");
                None
            }
        };

        let workflow = workflow_client_from_env();
        let mut dispatcher = SkillDispatcher::new(SkillDeps {
            llm: llm.clone(),
            workflow,
        });
        if let Err(err) = dispatcher.register_batch(generic_skills()) {
            warn!(%err, "failed to register a generic skill");
        }

        let retention_secs = std::env::var("GRAPH_RETENTION_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(3600);

        Self {
            sessions: SessionStore::from_env(),
            uploads: UploadJobStore::from_env(),
            llm,
            dispatcher: Arc::new(dispatcher),
            settings: GraphSettings::from_env(),
            tasks: Arc::new(TaskRegistry::new(Duration::from_secs(retention_secs))),
            spool_dir: std::env::var("UPLOAD_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/uploads")),
        }
    }

    /// State for tests: in-memory stores, injectable collaborators.
    pub fn for_tests(llm: Option<Arc<LlmClient>>, settings: GraphSettings) -> Self {
        let mut dispatcher = SkillDispatcher::new(SkillDeps {
            llm: llm.clone(),
            workflow: None,
        });
        dispatcher
            .register_batch(generic_skills())
            .expect("generic skills register");
        Self {
            sessions: Arc::new(SessionStore::memory()),
            uploads: Arc::new(UploadJobStore::memory()),
            llm,
            dispatcher: Arc::new(dispatcher),
            settings,
            tasks: Arc::new(TaskRegistry::new(Duration::from_secs(3600))),
            spool_dir: std::env::temp_dir().join("contract-ai-spool"),
        }
    }
}

fn workflow_client_from_env() -> Option<Arc<WorkflowClient>> {
    let base_url = std::env::var("WORKFLOW_API_URL").ok().filter(|v| !v.trim().is_empty())?;
    let api_key = std::env::var("WORKFLOW_API_KEY").ok().filter(|v| !v.trim().is_empty())?;
    match WorkflowClient::new(WorkflowClientConfig {
        base_url,
        api_key,
        ..Default::default()
    }) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            warn!(%err, "workflow client unavailable, remote skills disabled");
            None
        }
    }
}
