//! Tool-calling client seam.
//!
//! The runtime does not speak any tool transport itself; it drives an
//! injected [`ToolClient`] that owns discovery, invocation, and
//! network/timeout semantics of the underlying protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Schema-described callable action exposed by a registered manual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Descriptor telling the client how to load a manual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call_template_type", rename_all = "lowercase")]
pub enum CallTemplate {
    /// Manual loaded from a local descriptor file.
    Text { name: String, file_path: String },
    /// Manual fetched from a remote endpoint (e.g. an OpenAPI spec).
    Http {
        name: String,
        http_method: String,
        url: String,
        content_type: String,
    },
}

impl CallTemplate {
    pub fn name(&self) -> &str {
        match self {
            CallTemplate::Text { name, .. } => name,
            CallTemplate::Http { name, .. } => name,
        }
    }
}

/// External tool-calling client collaborator.
///
/// `call_tool` takes the qualified `"<tool>.<action>"` name. Implementations
/// own transport-level behavior; the runtime layers its own per-step timeout
/// and retry policy on top.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value>;

    async fn register_manual(&self, template: CallTemplate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_template_serializes_with_type_tag() {
        let template = CallTemplate::Text {
            name: "betfair".to_string(),
            file_path: "tools/betfair.utcp.json".to_string(),
        };
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["call_template_type"], "text");
        assert_eq!(value["name"], "betfair");
    }

    #[test]
    fn tool_spec_fills_missing_fields_with_defaults() {
        let spec: ToolSpec = serde_json::from_value(json!({"name": "betfair.getOdds"})).unwrap();
        assert_eq!(spec.name, "betfair.getOdds");
        assert!(spec.description.is_empty());
        assert!(spec.tags.is_empty());
    }
}
