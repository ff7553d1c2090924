//! Startup recovery: rebuild active sessions, reschedule or fail orphaned
//! upload jobs.

use std::sync::Arc;

use tracing::{info, warn};

use review_graph::engine::SessionCheckpointer;
use review_graph::{Checkpointer, GraphContext, ReviewGraph};

use crate::core::app_state::AppState;
use crate::routes::uploads::spawn_ingestion;
use crate::tasks::TaskEntry;

/// Rehydrates active sessions into the task registry and reschedules
/// recoverable upload jobs. Jobs whose task no longer exists are failed.
pub async fn recover_on_startup(state: &Arc<AppState>) {
    let sessions = match state.sessions.list_active().await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "could not list active sessions, skipping session recovery");
            Vec::new()
        }
    };

    for row in sessions {
        let task_id = row.task_id.clone();
        let graph = Arc::new(ReviewGraph::new(
            GraphContext {
                llm: state.llm.clone(),
                dispatcher: Some(state.dispatcher.clone()),
                settings: state.settings.clone(),
            },
            Checkpointer::Session(SessionCheckpointer::new(
                state.sessions.clone(),
                row.graph_run_id.clone(),
            )),
            None,
        ));
        if !graph.restore_from_checkpoint(&task_id).await {
            warn!(task_id, "session row without a usable checkpoint, skipping");
            continue;
        }

        let mut entry = TaskEntry::new(graph, row.graph_run_id.clone());
        entry.domain_id = (!row.domain_id.is_empty()).then(|| row.domain_id.clone());
        entry.our_party = row.our_party.clone();
        entry.language = row.language.clone();
        if state.tasks.insert(&task_id, entry).await {
            info!(task_id, status = ?row.status, "session restored into registry");
        }
    }

    let jobs = match state.uploads.recoverable_jobs().await {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!(%err, "could not list recoverable upload jobs");
            return;
        }
    };

    for job in jobs {
        if state.tasks.contains(&job.task_id).await {
            info!(task_id = %job.task_id, job_id = %job.job_id, "rescheduling recoverable upload job");
            spawn_ingestion(state.clone(), job.task_id.clone(), job.job_id.clone());
        } else {
            warn!(task_id = %job.task_id, job_id = %job.job_id, "upload job orphaned by restart, marking failed");
            if let Err(err) = state
                .uploads
                .mark_failed(&job.job_id, "task no longer active after restart")
                .await
            {
                warn!(job_id = %job.job_id, %err, "failed to mark orphaned job");
            }
        }
    }
}
