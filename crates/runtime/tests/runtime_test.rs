use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use utp_runtime::{
    planner::PlannerBackend, CallTemplate, Error, Result, Runtime, RuntimeConfig, SessionStatus,
    ToolClient, ToolSpec,
};

/// Tool client test double recording every interaction.
struct RecordingClient {
    calls: Mutex<Vec<(String, Value)>>,
    manuals: Mutex<Vec<CallTemplate>>,
    closed: AtomicBool,
}

impl RecordingClient {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            manuals: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolClient for RecordingClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(vec![
            ToolSpec {
                name: "betfair".to_string(),
                description: "betting exchange".to_string(),
                inputs: json!({"market": "string"}),
                outputs: json!({"back": "number"}),
                tags: vec!["betting".to_string()],
            },
            ToolSpec {
                name: "notifier".to_string(),
                description: "sends messages".to_string(),
                inputs: json!({"body": "any"}),
                outputs: json!("string"),
                tags: Vec::new(),
            },
        ])
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), args));
        match name {
            "betfair.getOdds" => Ok(json!({"back": 2.5, "lay": 2.6})),
            "notifier.send" => Ok(json!("sent")),
            other => Err(Error::ToolInvocation(format!("unknown tool: {other}"))),
        }
    }

    async fn register_manual(&self, template: CallTemplate) -> Result<()> {
        self.manuals.lock().unwrap().push(template);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Planner backend test double returning a fixed response.
struct ScriptedBackend(&'static str);

#[async_trait]
impl PlannerBackend for ScriptedBackend {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        discovery_paths: Vec::new(),
        ..RuntimeConfig::default()
    }
}

const TWO_STEP_PLAN: &str = r#"Here is the workflow:
```json
{
    "steps": [
        {"tool": "betfair", "action": "getOdds", "params": {"market": "1.23"}},
        {"tool": "notifier", "action": "send", "params": {"body": "$step_1"}}
    ],
    "expected_output": "odds delivered to the user"
}
```"#;

#[tokio::test]
async fn request_is_planned_and_executed_end_to_end() {
    init_tracing();
    let client = Arc::new(RecordingClient::new());
    let runtime = Runtime::create(
        client.clone(),
        Arc::new(ScriptedBackend(TWO_STEP_PLAN)),
        &test_config(),
    )
    .await
    .expect("runtime should initialize");

    let result = runtime
        .execute("send me the odds for market 1.23", None, None)
        .await
        .expect("workflow should complete");

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps.iter().all(|s| s.success));
    assert_eq!(result.final_state["step_1"], json!({"back": 2.5, "lay": 2.6}));
    assert_eq!(result.final_state["step_2"], json!("sent"));

    // The second step received the first step's output, not the marker.
    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "betfair.getOdds");
    assert_eq!(calls[1].0, "notifier.send");
    assert_eq!(calls[1].1["body"], json!({"back": 2.5, "lay": 2.6}));

    // Lifecycle events arrived in order on the bus.
    let bus = runtime.event_bus();
    let types: Vec<String> = bus
        .history(None)
        .await
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            "workflow.started",
            "workflow.planned",
            "execution.started",
            "step.started",
            "step.completed",
            "step.started",
            "step.completed",
            "execution.completed",
            "workflow.completed",
        ]
    );

    // Session projections are available after the run.
    let summaries = runtime.engine().list_sessions().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].steps_count, 2);
    let session = runtime
        .engine()
        .get_session(&result.session_id)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn unknown_planned_tool_aborts_before_any_invocation() {
    let client = Arc::new(RecordingClient::new());
    let runtime = Runtime::create(
        client.clone(),
        Arc::new(ScriptedBackend(
            "```json\n{\"steps\": [{\"tool\": \"stocks\", \"action\": \"buy\", \"params\": {}}], \"expected_output\": \"x\"}\n```",
        )),
        &test_config(),
    )
    .await
    .unwrap();

    let err = runtime.execute("buy some stocks", None, None).await.unwrap_err();
    assert!(matches!(err, Error::WorkflowFormat(_)));
    assert!(client.calls().is_empty());

    let bus = runtime.event_bus();
    assert_eq!(bus.history(Some("workflow.error")).await.len(), 1);
    assert!(bus.history(Some("execution.started")).await.is_empty());
}

#[tokio::test]
async fn fatal_step_failure_surfaces_as_session_fatal() {
    // The plan references a tool that exists in the catalog but whose
    // invocation always fails, with retries disabled.
    let plan = r#"```json
{
    "steps": [
        {"tool": "betfair", "action": "settle", "params": {}, "retry_on_error": false, "max_retries": 0}
    ],
    "expected_output": "never"
}
```"#;
    let client = Arc::new(RecordingClient::new());
    let runtime = Runtime::create(
        client.clone(),
        Arc::new(ScriptedBackend(plan)),
        &test_config(),
    )
    .await
    .unwrap();

    let err = runtime.execute("settle my bets", None, None).await.unwrap_err();
    assert!(matches!(err, Error::SessionFatal(_)));

    let bus = runtime.event_bus();
    assert_eq!(bus.history(Some("step.failed")).await.len(), 1);
    assert_eq!(bus.history(Some("execution.failed")).await.len(), 1);
    assert_eq!(bus.history(Some("workflow.error")).await.len(), 1);

    let summaries = runtime.engine().list_sessions().await;
    assert_eq!(summaries[0].status, SessionStatus::Failed);
    // The fatal attempt is still visible in the session record.
    assert_eq!(summaries[0].steps_count, 1);
}

#[tokio::test]
async fn manuals_are_registered_from_files_and_discovery_paths() {
    let dir = std::env::temp_dir().join(format!("utp-runtime-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("betfair.utcp.json"), r#"{"tools": []}"#).unwrap();

    let client = Arc::new(RecordingClient::new());
    let config = RuntimeConfig {
        discovery_paths: vec![dir.clone()],
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::create(
        client.clone(),
        Arc::new(ScriptedBackend("")),
        &config,
    )
    .await
    .unwrap();

    // One manual picked up by startup discovery.
    assert_eq!(client.manuals.lock().unwrap().len(), 1);

    // Manual registration of another descriptor.
    let extra = dir.join("odds.utcp.yaml");
    std::fs::write(&extra, "tools: []").unwrap();
    runtime.register_tool_manual(&extra).await.unwrap();
    {
        let manuals = client.manuals.lock().unwrap();
        assert_eq!(manuals.len(), 2);
        assert_eq!(manuals[1].name(), "odds");
    }

    let tools = runtime.available_tools().await.unwrap();
    assert_eq!(tools.len(), 2);

    runtime.close().await.unwrap();
    assert!(client.closed.load(Ordering::SeqCst));
    assert!(runtime.event_bus().history(None).await.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}
