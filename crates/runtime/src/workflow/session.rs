//! Session state for one workflow execution.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::WorkflowDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a single step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

/// A fatal error recorded against a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Mutable execution record for one `execute` call.
///
/// Owned exclusively by the execution engine for its lifetime; callers only
/// ever see clones. `state` holds an entry per successful step and nothing
/// else, and `status` moves running -> completed|failed, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub workflow: WorkflowDoc,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepResult>,
    pub state: HashMap<String, Value>,
    pub errors: Vec<ErrorRecord>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(session_id: String, workflow: WorkflowDoc) -> Self {
        Self {
            session_id,
            workflow,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            steps: Vec::new(),
            state: HashMap::new(),
            errors: Vec::new(),
            status: SessionStatus::Running,
        }
    }

    /// Fold a step outcome into the session. Successful outputs land in
    /// `state` under the step id; failures are only visible in `steps`.
    pub fn record_step(&mut self, result: StepResult) {
        if result.success {
            self.state.insert(
                result.step_id.clone(),
                result.output.clone().unwrap_or(Value::Null),
            );
        }
        self.steps.push(result);
    }

    pub fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, record: ErrorRecord) {
        self.status = SessionStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.errors.push(record);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            started_at: self.started_at,
            steps_count: self.steps.len(),
        }
    }

    pub fn to_execution_result(&self) -> ExecutionResult {
        ExecutionResult {
            session_id: self.session_id.clone(),
            status: self.status,
            steps: self.steps.clone(),
            final_state: self.state.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Read-only projection returned by `list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub steps_count: usize,
}

/// Aggregate returned to the caller of `execute_workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub session_id: String,
    pub status: SessionStatus,
    pub steps: Vec<StepResult>,
    pub final_state: HashMap<String, Value>,
    pub errors: Vec<ErrorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_workflow() -> WorkflowDoc {
        WorkflowDoc {
            steps: Vec::new(),
            expected_output: String::new(),
        }
    }

    #[test]
    fn successful_steps_land_in_state() {
        let mut session = Session::new("s".to_string(), empty_workflow());
        session.record_step(StepResult {
            step_id: "step_1".to_string(),
            success: true,
            output: Some(json!({"odds": 2.5})),
            error: None,
            retry_count: 0,
        });
        session.record_step(StepResult {
            step_id: "step_2".to_string(),
            success: false,
            output: None,
            error: Some("boom".to_string()),
            retry_count: 3,
        });

        assert_eq!(session.steps.len(), 2);
        assert_eq!(session.state.len(), 1);
        assert_eq!(session.state["step_1"], json!({"odds": 2.5}));
        assert!(!session.state.contains_key("step_2"));
    }

    #[test]
    fn status_transitions_stamp_timestamps() {
        let mut session = Session::new("s".to_string(), empty_workflow());
        assert_eq!(session.status, SessionStatus::Running);

        session.mark_failed(ErrorRecord {
            error: "denied".to_string(),
            kind: "PermissionError".to_string(),
        });
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.failed_at.is_some());
        assert_eq!(session.errors.len(), 1);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SessionStatus::Completed).unwrap(),
            json!("completed")
        );
        assert_eq!(SessionStatus::Failed.to_string(), "failed");
    }
}
