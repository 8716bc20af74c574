//! Planner model backends.
//!
//! Provides a unified interface over LLM providers using Rig. The runtime
//! treats the backend as an opaque function from a prompt string to
//! free-form text; format handling lives in the planner itself.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use rig::completion::Prompt;
use rig::providers::{anthropic, openai};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
            api_key: None,
            temperature: Some(0.7),
            max_tokens: Some(4096),
        }
    }
}

/// Backend that turns a planning prompt into free-form text.
#[async_trait::async_trait]
pub trait PlannerBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Anthropic Claude backend using Rig.
pub struct AnthropicBackend {
    client: anthropic::Client,
    model: String,
}

impl AnthropicBackend {
    pub fn new(api_key: Option<String>, model: &str) -> Result<Self> {
        let client = if let Some(key) = api_key {
            anthropic::Client::new(
                &key,
                "https://api.anthropic.com",
                None,
                anthropic::ANTHROPIC_VERSION_LATEST,
            )
        } else {
            // Reads ANTHROPIC_API_KEY from the environment.
            anthropic::Client::from_env()
        };

        Ok(Self {
            client,
            model: model.to_string(),
        })
    }

    /// Map model name to Rig's model constant.
    fn model_id(&self) -> &'static str {
        match self.model.as_str() {
            "claude-3-5-sonnet" | "claude-3-5-sonnet-20241022" => anthropic::CLAUDE_3_5_SONNET,
            "claude-3-7-sonnet" => anthropic::CLAUDE_3_7_SONNET,
            "claude-3-haiku" | "claude-3-haiku-20240307" => anthropic::CLAUDE_3_HAIKU,
            "claude-3-opus" | "claude-3-opus-20240229" => anthropic::CLAUDE_3_OPUS,
            "claude-3-sonnet" | "claude-3-sonnet-20240229" => anthropic::CLAUDE_3_SONNET,
            _ => anthropic::CLAUDE_3_5_SONNET,
        }
    }
}

#[async_trait::async_trait]
impl PlannerBackend for AnthropicBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let agent = self.client.agent(self.model_id()).build();

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| anyhow::anyhow!("Anthropic API error: {:?}", e))?;

        Ok(response)
    }
}

/// OpenAI backend using Rig.
pub struct OpenAiBackend {
    client: openai::Client,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, model: &str) -> Result<Self> {
        let client = if let Some(key) = api_key {
            openai::Client::new(&key)
        } else {
            // Reads OPENAI_API_KEY from the environment.
            openai::Client::from_env()
        };

        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PlannerBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let agent = self.client.agent(&self.model).build();

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI API error: {:?}", e))?;

        Ok(response)
    }
}

/// Deterministic backend for tests and offline runs: always plans an empty
/// workflow.
pub struct MockBackend;

#[async_trait::async_trait]
impl PlannerBackend for MockBackend {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok("```json\n{\"steps\": [], \"expected_output\": \"nothing to do\"}\n```".to_string())
    }
}

/// Create a backend from configuration.
pub fn create_backend(config: &PlannerConfig) -> Result<Arc<dyn PlannerBackend>> {
    match config.provider.as_str() {
        "anthropic" | "claude" => {
            let backend = AnthropicBackend::new(config.api_key.clone(), &config.model)?;
            Ok(Arc::new(backend))
        }
        "openai" => {
            let backend = OpenAiBackend::new(config.api_key.clone(), &config.model)?;
            Ok(Arc::new(backend))
        }
        _ => Ok(Arc::new(MockBackend)),
    }
}
