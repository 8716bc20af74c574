//! Single-step execution: authorization, invocation, timeout, bounded retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::{
    events::EventBus,
    policy::PolicyGate,
    workflow::{resolve_params, StepResult, StepSpec},
    Error, ToolClient,
};

/// Failure classification for one step execution.
///
/// `Retryable` wraps a tool invocation failure (including timeout) that the
/// retry policy may absorb; `Fatal` aborts the whole session and is never
/// retried. A fatal invocation failure carries the attempted step's result
/// so the session record still shows the attempt; authorization denials
/// happen before any invocation and carry none.
#[derive(Debug)]
pub enum StepError {
    Retryable(Error),
    Fatal {
        error: Error,
        attempted: Option<StepResult>,
    },
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Retryable(_))
    }

    pub fn into_parts(self) -> (Error, Option<StepResult>) {
        match self {
            StepError::Retryable(e) => (e, None),
            StepError::Fatal { error, attempted } => (error, attempted),
        }
    }

    pub fn into_inner(self) -> Error {
        self.into_parts().0
    }

    pub fn inner(&self) -> &Error {
        match self {
            StepError::Retryable(e) => e,
            StepError::Fatal { error, .. } => error,
        }
    }
}

/// Executes one workflow step against the tool client.
///
/// Attempt states: pending -> authorized -> invoking -> succeeded | retrying
/// | failed. Authorization denials fail immediately regardless of the step's
/// retry policy; invocation failures retry with exponential backoff while
/// the budget lasts.
pub struct StepExecutor {
    client: Arc<dyn ToolClient>,
    policy: Arc<PolicyGate>,
    bus: Arc<EventBus>,
}

impl StepExecutor {
    pub fn new(client: Arc<dyn ToolClient>, policy: Arc<PolicyGate>, bus: Arc<EventBus>) -> Self {
        Self {
            client,
            policy,
            bus,
        }
    }

    /// Execute one step. A `Fatal` error aborts the session; an exhausted
    /// retry budget with `retry_on_error` set is absorbed into a
    /// `StepResult { success: false, .. }` so the workflow can continue.
    pub async fn execute_step(
        &self,
        step: &StepSpec,
        session_id: &str,
        state: &HashMap<String, Value>,
    ) -> Result<StepResult, StepError> {
        let params = resolve_params(&step.params, state);

        if !self.policy.can_execute(&step.tool, &step.action).await {
            return Err(StepError::Fatal {
                error: Error::Permission(format!(
                    "Cannot execute {}.{}",
                    step.tool, step.action
                )),
                attempted: None,
            });
        }

        self.bus
            .emit(
                "step.started",
                json!({
                    "session_id": session_id,
                    "step_id": step.id,
                    "tool": step.tool,
                    "action": step.action,
                }),
            )
            .await;

        let qualified = format!("{}.{}", step.tool, step.action);
        let args = Value::Object(params.into_iter().collect());
        let mut retry_count: u32 = 0;

        let last_error = loop {
            match self.attempt(&qualified, args.clone(), step.timeout_seconds).await {
                Ok(output) => {
                    info!(step_id = %step.id, retry_count, "Step completed");
                    self.bus
                        .emit(
                            "step.completed",
                            json!({
                                "session_id": session_id,
                                "step_id": step.id,
                                "result": output,
                            }),
                        )
                        .await;
                    return Ok(StepResult {
                        step_id: step.id.clone(),
                        success: true,
                        output: Some(output),
                        error: None,
                        retry_count,
                    });
                }
                Err(e) => {
                    if e.is_retryable() && step.retry_on_error && retry_count < step.max_retries {
                        // Backoff is computed from the current retry count,
                        // before it is incremented for the next attempt.
                        let delay = Duration::from_secs(2u64.pow(retry_count.min(16)));
                        warn!(
                            step_id = %step.id,
                            attempt = retry_count + 1,
                            max_retries = step.max_retries,
                            "Step failed, retrying after {:?}: {}",
                            delay,
                            e.inner()
                        );
                        sleep(delay).await;
                        retry_count += 1;
                    } else {
                        break e;
                    }
                }
            }
        };

        let cause = last_error.into_inner();
        error!(step_id = %step.id, retry_count, "Step failed: {}", cause);
        self.bus
            .emit(
                "step.failed",
                json!({
                    "session_id": session_id,
                    "step_id": step.id,
                    "error": cause.to_string(),
                }),
            )
            .await;

        if !step.retry_on_error {
            return Err(StepError::Fatal {
                attempted: Some(StepResult {
                    step_id: step.id.clone(),
                    success: false,
                    output: None,
                    error: Some(cause.to_string()),
                    retry_count,
                }),
                error: cause,
            });
        }

        Ok(StepResult {
            step_id: step.id.clone(),
            success: false,
            output: None,
            error: Some(cause.to_string()),
            retry_count,
        })
    }

    async fn attempt(
        &self,
        qualified: &str,
        args: Value,
        timeout_seconds: u64,
    ) -> Result<Value, StepError> {
        match timeout(
            Duration::from_secs(timeout_seconds),
            self.client.call_tool(qualified, args),
        )
        .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(Error::ToolInvocation(msg))) => {
                Err(StepError::Retryable(Error::ToolInvocation(msg)))
            }
            Ok(Err(other)) => Err(StepError::Retryable(Error::ToolInvocation(
                other.to_string(),
            ))),
            Err(_) => Err(StepError::Retryable(Error::ToolInvocation(format!(
                "{qualified} timed out after {timeout_seconds}s"
            )))),
        }
    }
}
