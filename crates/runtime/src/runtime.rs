//! Top-level runtime facade.
//!
//! Wires the event bus, policy gate, planner, discovery, and execution
//! engine around an injected tool client and planner backend, and exposes
//! the public entry points: `execute`, `available_tools`,
//! `register_tool_manual`, `close`.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::{
    config::RuntimeConfig,
    discovery::DiscoveryLayer,
    events::EventBus,
    planner::{PlannerBackend, WorkflowPlanner},
    policy::PolicyGate,
    workflow::{ExecutionEngine, ExecutionResult, StepExecutor},
    Result, ToolClient, ToolSpec,
};

pub struct Runtime {
    client: Arc<dyn ToolClient>,
    discovery: DiscoveryLayer,
    planner: WorkflowPlanner,
    engine: Arc<ExecutionEngine>,
    bus: Arc<EventBus>,
    policy: Arc<PolicyGate>,
}

impl Runtime {
    /// Create and initialize the runtime, running manual auto-discovery over
    /// the configured paths.
    pub async fn create(
        client: Arc<dyn ToolClient>,
        backend: Arc<dyn PlannerBackend>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let policy = Arc::new(PolicyGate::from_config(&config.policy));

        let executor = StepExecutor::new(client.clone(), policy.clone(), bus.clone());
        let engine = Arc::new(ExecutionEngine::new(executor, bus.clone()));
        let planner = WorkflowPlanner::new(client.clone(), backend, bus.clone());
        let discovery = DiscoveryLayer::new(client.clone(), config.discovery_paths.clone());

        let discovered = discovery.discover_and_register().await?;
        info!(discovered, "Runtime initialized");

        Ok(Self {
            client,
            discovery,
            planner,
            engine,
            bus,
            policy,
        })
    }

    /// Main entry point: plan the request into a workflow and execute it.
    pub async fn execute(
        &self,
        request: &str,
        session_id: Option<String>,
        context: Option<Value>,
    ) -> Result<ExecutionResult> {
        self.bus
            .emit(
                "workflow.started",
                json!({
                    "request": request,
                    "session_id": session_id,
                }),
            )
            .await;

        match self.plan_and_run(request, session_id.clone(), context).await {
            Ok(result) => {
                self.bus
                    .emit(
                        "workflow.completed",
                        json!({
                            "session_id": result.session_id,
                            "result": result,
                        }),
                    )
                    .await;
                Ok(result)
            }
            Err(e) => {
                self.bus
                    .emit(
                        "workflow.error",
                        json!({
                            "session_id": session_id,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn plan_and_run(
        &self,
        request: &str,
        session_id: Option<String>,
        context: Option<Value>,
    ) -> Result<ExecutionResult> {
        let workflow = self.planner.plan_workflow(request, context.as_ref()).await?;
        self.engine.execute_workflow(workflow, session_id).await
    }

    /// All available tools with schemas.
    pub async fn available_tools(&self) -> Result<Vec<ToolSpec>> {
        self.client.list_tools().await
    }

    /// Manually register a manual descriptor file.
    pub async fn register_tool_manual(&self, path: &Path) -> Result<()> {
        self.discovery.register_manual(path).await
    }

    /// Release the tool client and drop all bus subscribers and history.
    pub async fn close(&self) -> Result<()> {
        self.client.close().await?;
        self.bus.close().await;
        Ok(())
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn policy(&self) -> &Arc<PolicyGate> {
        &self.policy
    }
}
