use crate::types::{StepId, WorkflowId, WorkflowStatus};
use thiserror::Error;

/// Errors produced while validating or executing a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Pending steps remain but none of them can become ready
    #[error("Workflow execution blocked - check dependencies")]
    Blocked { pending: Vec<StepId> },

    /// A tool invocation failed; carries the tool's error message
    #[error("{message}")]
    StepFailed { step_id: StepId, message: String },

    #[error("Workflow is already active")]
    AlreadyActive,

    #[error("Cannot {operation} a workflow in status {status}")]
    InvalidState {
        status: WorkflowStatus,
        operation: &'static str,
    },

    /// Execution stopped between waves after a pause request
    #[error("Workflow paused")]
    Paused,

    #[error("Dependency {dependency} not found for step {step_id}")]
    UnknownDependency { step_id: StepId, dependency: StepId },

    #[error("Step {step_id} not found")]
    StepNotFound { step_id: StepId },

    #[error("Step {step_id} is defined more than once")]
    DuplicateStep { step_id: StepId },

    #[error("Workflow contains circular dependencies: {}", join_ids(.steps))]
    CyclicDependency { steps: Vec<StepId> },

    #[error("Workflow {0} is not running")]
    NotRunning(WorkflowId),
}

impl WorkflowError {
    /// Step that triggered the error, if any
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            WorkflowError::StepFailed { step_id, .. }
            | WorkflowError::UnknownDependency { step_id, .. }
            | WorkflowError::DuplicateStep { step_id }
            | WorkflowError::StepNotFound { step_id } => Some(step_id),
            _ => None,
        }
    }
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
