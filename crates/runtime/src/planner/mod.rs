//! Workflow planning and validation.
//!
//! Converts a natural-language request into a validated [`WorkflowDoc`]: the
//! current tool catalog is serialized into a planning prompt, the backend's
//! free-form answer is parsed, and every planned step is cross-checked
//! against the catalog before anything executes.

pub mod parse;
pub mod provider;

pub use parse::extract_structured_payload;
pub use provider::{create_backend, MockBackend, PlannerBackend, PlannerConfig};

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{events::EventBus, workflow::WorkflowDoc, Error, Result, ToolClient, ToolSpec};

pub struct WorkflowPlanner {
    client: Arc<dyn ToolClient>,
    backend: Arc<dyn PlannerBackend>,
    bus: Arc<EventBus>,
}

impl WorkflowPlanner {
    pub fn new(
        client: Arc<dyn ToolClient>,
        backend: Arc<dyn PlannerBackend>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            client,
            backend,
            bus,
        }
    }

    /// Plan a multi-step workflow from a natural-language request.
    ///
    /// Guarantees that every step in the returned document names a tool
    /// present in the catalog; an unknown tool aborts planning before any
    /// invocation can happen.
    pub async fn plan_workflow(
        &self,
        request: &str,
        context: Option<&Value>,
    ) -> Result<WorkflowDoc> {
        let tools = self.client.list_tools().await?;
        let prompt = build_planning_prompt(request, &tools, context);
        debug!(tools = tools.len(), "Requesting workflow plan");

        let response = self
            .backend
            .complete(&prompt)
            .await
            .map_err(|e| Error::Planner(e.to_string()))?;

        let payload = extract_structured_payload(&response)?;
        let mut workflow: WorkflowDoc = serde_json::from_value(payload)
            .map_err(|e| Error::WorkflowFormat(format!("workflow does not match schema: {e}")))?;
        workflow.normalize_ids();

        validate_against_catalog(&workflow, &tools)?;
        info!(steps = workflow.steps.len(), "Workflow planned");

        self.bus
            .emit(
                "workflow.planned",
                json!({
                    "workflow": workflow,
                    "request": request,
                }),
            )
            .await;

        Ok(workflow)
    }
}

fn validate_against_catalog(workflow: &WorkflowDoc, tools: &[ToolSpec]) -> Result<()> {
    let catalog: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    for step in &workflow.steps {
        if !catalog.contains(step.tool.as_str()) {
            return Err(Error::WorkflowFormat(format!(
                "Tool not found: {}",
                step.tool
            )));
        }
    }
    Ok(())
}

fn build_planning_prompt(request: &str, tools: &[ToolSpec], context: Option<&Value>) -> String {
    let context_block = match context {
        Some(value) => format!(
            "\nAdditional Context:\n{}\n",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        None => String::new(),
    };
    let tool_schemas =
        serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are a workflow planning system. Plan a multi-step workflow to accomplish the user's request.

User Request: {request}
{context_block}
Available Tools:
{tool_schemas}

Create a workflow plan. Return ONLY valid JSON in this format:
{{
    "steps": [
        {{
            "id": "step_1",
            "tool": "tool_name",
            "action": "action_name",
            "params": {{}},
            "depends_on": [],
            "retry_on_error": true,
            "timeout": 30
        }}
    ],
    "expected_output": "description of final result"
}}

Rules:
- Use tool names exactly as shown in the catalog
- A step may reference a previous step's output with "$step_id" in params
- Include all required parameters for each tool
- Plan for error handling and retries
- Consider data flow between steps
"#
    )
}
