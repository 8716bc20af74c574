use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{planner::PlannerConfig, policy::PolicyConfig, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Opaque configuration handed to the tool client by the embedder.
    #[serde(default)]
    pub utcp: Value,
    /// Directories scanned for manual descriptor files at startup.
    #[serde(default = "default_discovery_paths")]
    pub discovery_paths: Vec<PathBuf>,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

fn default_discovery_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("./tools"), PathBuf::from("./connectors")]
}

impl RuntimeConfig {
    /// Build configuration from environment variables with defaults.
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let discovery_paths = std::env::var("UTP_DISCOVERY_PATHS")
            .map(|raw| {
                raw.split(',')
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_else(|_| default_discovery_paths());

        let planner = PlannerConfig {
            provider: std::env::var("PLANNER_PROVIDER")
                .unwrap_or_else(|_| "anthropic".to_string()),
            model: std::env::var("PLANNER_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet".to_string()),
            api_key: std::env::var("PLANNER_API_KEY").ok(),
            temperature: std::env::var("PLANNER_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok()),
            max_tokens: std::env::var("PLANNER_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        if planner.api_key.is_none() && planner.provider != "mock" {
            tracing::warn!(
                "PLANNER_API_KEY is not set. Workflow planning may not work properly."
            );
        }

        Ok(Self {
            utcp: Value::Null,
            discovery_paths,
            planner,
            policy: PolicyConfig::default(),
        })
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            utcp: Value::Null,
            discovery_paths: default_discovery_paths(),
            planner: PlannerConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}
