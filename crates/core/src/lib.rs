// Core types and the dependency-ordered workflow executor for EVA tool workflows

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod storage;
pub mod tools;
pub mod types;
pub mod workflow;

pub use catalog::{WorkflowCatalog, WorkflowTemplate};
pub use config::{ExecutorConfig, FailurePolicy};
pub use error::WorkflowError;
pub use types::*;
pub use workflow::{WorkflowDag, WorkflowExecutor};
