use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A state transition recorded while driving a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub workflow_id: WorkflowId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl Event {
    pub fn new(workflow_id: WorkflowId, event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            timestamp: Utc::now(),
            event_type,
        }
    }
}

/// Types of events emitted by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    // Workflow lifecycle events
    WorkflowStarted {
        name: String,
        step_count: usize,
    },
    WorkflowCompleted {
        duration_ms: u64,
    },
    WorkflowFailed {
        error: String,
        duration_ms: u64,
    },
    WorkflowPaused,
    WorkflowReset,

    // Step lifecycle events
    StepStarted {
        step_id: StepId,
        tool_id: String,
    },
    StepCompleted {
        step_id: StepId,
        duration_ms: u64,
    },
    StepFailed {
        step_id: StepId,
        error: String,
    },
    StepSkipped {
        step_id: StepId,
        reason: String,
    },
}

impl EventType {
    /// Step the event refers to, if it is a step event
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            EventType::StepStarted { step_id, .. }
            | EventType::StepCompleted { step_id, .. }
            | EventType::StepFailed { step_id, .. }
            | EventType::StepSkipped { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

/// Event log writer trait
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event to the log
    async fn append(&self, event: Event) -> anyhow::Result<()>;

    /// Get all events for a workflow, oldest first
    async fn get_workflow_events(&self, workflow_id: WorkflowId) -> anyhow::Result<Vec<Event>>;
}
