//! Session-owning workflow execution engine.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    events::EventBus,
    workflow::{
        ErrorRecord, ExecutionResult, Session, SessionSummary, StepExecutor, WorkflowDoc,
    },
    Error, Result,
};

/// Drives workflow steps strictly in declared order and owns session state.
///
/// The session map is shared across concurrent `execute_workflow` calls, but
/// each session is only ever mutated by the task driving it; `depends_on`
/// hints are never used for reordering or parallelism.
pub struct ExecutionEngine {
    executor: StepExecutor,
    bus: Arc<EventBus>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl ExecutionEngine {
    pub fn new(executor: StepExecutor, bus: Arc<EventBus>) -> Self {
        Self {
            executor,
            bus,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Execute a workflow document under a new or caller-supplied session id.
    ///
    /// Returns `Ok` when every step has been attempted, even if some steps
    /// failed non-fatally; returns `Err(SessionFatal)` when a step's failure
    /// aborts the session (authorization denial, or exhausted retries with
    /// `retry_on_error` disabled). Every invoked step, including a fatally
    /// failed one, appears in the session's step results; a denied step was
    /// never invoked and does not.
    pub async fn execute_workflow(
        &self,
        workflow: WorkflowDoc,
        session_id: Option<String>,
    ) -> Result<ExecutionResult> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut workflow = workflow;
        workflow.normalize_ids();

        info!(%session_id, steps = workflow.steps.len(), "Executing workflow");
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                session_id.clone(),
                Session::new(session_id.clone(), workflow.clone()),
            );
        }

        self.bus
            .emit(
                "execution.started",
                json!({
                    "session_id": session_id,
                    "workflow": workflow,
                }),
            )
            .await;

        for step in &workflow.steps {
            let state = {
                let sessions = self.sessions.read().await;
                sessions
                    .get(&session_id)
                    .map(|s| s.state.clone())
                    .unwrap_or_default()
            };

            match self.executor.execute_step(step, &session_id, &state).await {
                Ok(result) => {
                    let mut sessions = self.sessions.write().await;
                    if let Some(session) = sessions.get_mut(&session_id) {
                        session.record_step(result);
                    }
                }
                Err(step_error) => {
                    let (cause, attempted) = step_error.into_parts();
                    error!(%session_id, step_id = %step.id, "Workflow aborted: {}", cause);

                    {
                        let mut sessions = self.sessions.write().await;
                        if let Some(session) = sessions.get_mut(&session_id) {
                            // An invoked-but-fatal step still counts as
                            // attempted in the session record.
                            if let Some(result) = attempted {
                                session.record_step(result);
                            }
                            session.mark_failed(ErrorRecord {
                                error: cause.to_string(),
                                kind: cause.kind().to_string(),
                            });
                        }
                    }

                    self.bus
                        .emit(
                            "execution.failed",
                            json!({
                                "session_id": session_id,
                                "error": cause.to_string(),
                            }),
                        )
                        .await;

                    return Err(Error::SessionFatal(format!(
                        "step '{}' failed: {}",
                        step.id, cause
                    )));
                }
            }
        }

        let result = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| Error::Internal(format!("session vanished: {session_id}")))?;
            session.mark_completed();
            session.to_execution_result()
        };

        self.bus
            .emit(
                "execution.completed",
                json!({
                    "session_id": session_id,
                    "result": result,
                }),
            )
            .await;

        Ok(result)
    }

    /// Read-only snapshot of one session.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Read-only summaries of every session this engine has driven.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|s| s.summary()).collect()
    }
}
