pub mod client;
pub mod config;
pub mod discovery;
pub mod events;
pub mod planner;
pub mod policy;
pub mod runtime;
pub mod workflow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Tool invocation failed: {0}")]
    ToolInvocation(String),
    #[error("Invalid workflow format: {0}")]
    WorkflowFormat(String),
    #[error("Session aborted: {0}")]
    SessionFatal(String),
    #[error("Planner error: {0}")]
    Planner(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Discovery error: {0}")]
    Discovery(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable taxonomy name, recorded into session error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Permission(_) => "PermissionError",
            Error::ToolInvocation(_) => "ToolInvocationError",
            Error::WorkflowFormat(_) => "WorkflowFormatError",
            Error::SessionFatal(_) => "SessionFatalError",
            Error::Planner(_) => "PlannerError",
            Error::Config(_) => "ConfigError",
            Error::Discovery(_) => "DiscoveryError",
            Error::Io(_) => "IoError",
            Error::SerdeJson(_) => "JsonError",
            Error::Internal(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub use client::{CallTemplate, ToolClient, ToolSpec};
pub use config::RuntimeConfig;
pub use events::{Event, EventBus};
pub use planner::WorkflowPlanner;
pub use policy::PolicyGate;
pub use runtime::Runtime;
pub use workflow::{
    ExecutionEngine, ExecutionResult, Session, SessionStatus, StepResult, StepSpec, WorkflowDoc,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(Error::Permission("x".into()).kind(), "PermissionError");
        assert_eq!(
            Error::ToolInvocation("x".into()).kind(),
            "ToolInvocationError"
        );
        assert_eq!(Error::SessionFatal("x".into()).kind(), "SessionFatalError");
    }
}
