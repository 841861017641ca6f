pub mod dag;
pub mod executor;
pub mod step_executor;

pub use dag::WorkflowDag;
pub use executor::{effective_input, StepOutputs, WorkflowExecutor};
pub use step_executor::{StepExecutor, StepOutcome};
