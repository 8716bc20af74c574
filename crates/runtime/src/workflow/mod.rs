pub mod doc;
pub mod engine;
pub mod executor;
pub mod resolver;
pub mod session;

pub use doc::{ParamValue, StepSpec, WorkflowDoc};
pub use engine::ExecutionEngine;
pub use executor::{StepError, StepExecutor};
pub use resolver::resolve_params;
pub use session::{
    ErrorRecord, ExecutionResult, Session, SessionStatus, SessionSummary, StepResult,
};
