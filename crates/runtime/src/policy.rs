//! Permission and policy gate for tool execution.
//!
//! Three checks run in order, short-circuiting on the first failure: tool
//! enablement (with an optional action allow-list), a pluggable rate-limit
//! rule, and a pluggable business rule. The gate answers with a plain bool;
//! callers treat a denial as a fatal, non-retryable authorization error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Pluggable rate-limit check, consulted after tool enablement.
#[async_trait]
pub trait RateLimitRule: Send + Sync {
    async fn check(&self, tool: &str, action: &str) -> bool;
}

/// Pluggable business-rule check, consulted last.
#[async_trait]
pub trait BusinessRule: Send + Sync {
    async fn check(&self, tool: &str, action: &str) -> bool;
}

/// Default rule that allows everything.
pub struct Permissive;

#[async_trait]
impl RateLimitRule for Permissive {
    async fn check(&self, _tool: &str, _action: &str) -> bool {
        true
    }
}

#[async_trait]
impl BusinessRule for Permissive {
    async fn check(&self, _tool: &str, _action: &str) -> bool {
        true
    }
}

/// Per-tool permission entry. An empty `allowed_actions` set permits every
/// action of an enabled tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPermissions {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_actions: HashSet<String>,
}

fn default_enabled() -> bool {
    true
}

/// Declarative policy configuration, loadable from the runtime config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub permissions: HashMap<String, ToolPermissions>,
}

pub struct PolicyGate {
    permissions: RwLock<HashMap<String, ToolPermissions>>,
    rate_limit: Arc<dyn RateLimitRule>,
    business_rule: Arc<dyn BusinessRule>,
}

impl PolicyGate {
    pub fn new() -> Self {
        Self::with_rules(Arc::new(Permissive), Arc::new(Permissive))
    }

    pub fn with_rules(
        rate_limit: Arc<dyn RateLimitRule>,
        business_rule: Arc<dyn BusinessRule>,
    ) -> Self {
        Self {
            permissions: RwLock::new(HashMap::new()),
            rate_limit,
            business_rule,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            permissions: RwLock::new(config.permissions.clone()),
            rate_limit: Arc::new(Permissive),
            business_rule: Arc::new(Permissive),
        }
    }

    /// Set or replace the permission entry for a tool.
    pub async fn set_permission(
        &self,
        tool: &str,
        enabled: bool,
        allowed_actions: HashSet<String>,
    ) {
        let mut permissions = self.permissions.write().await;
        permissions.insert(
            tool.to_string(),
            ToolPermissions {
                enabled,
                allowed_actions,
            },
        );
    }

    /// Check whether `tool.action` may be executed. Never errors; any failed
    /// check answers false.
    pub async fn can_execute(&self, tool: &str, action: &str) -> bool {
        {
            let permissions = self.permissions.read().await;
            if let Some(perms) = permissions.get(tool) {
                if !perms.enabled {
                    warn!(tool, "Tool is disabled");
                    return false;
                }
                if !perms.allowed_actions.is_empty() && !perms.allowed_actions.contains(action) {
                    warn!(tool, action, "Action not in allow-list");
                    return false;
                }
            }
        }

        if !self.rate_limit.check(tool, action).await {
            warn!(tool, action, "Rate limit exceeded");
            return false;
        }

        if !self.business_rule.check(tool, action).await {
            warn!(tool, action, "Business rule violation");
            return false;
        }

        true
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new()
    }
}
