use crate::tools::ToolExecutor;
use crate::types::StepId;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of invoking the tool behind one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub result: Result<Value, String>,
    pub duration: Duration,
}

/// Invokes the tool bound to a single step.
///
/// It holds no reference to the workflow, so invocations are `'static`
/// futures that can be polled side by side while the wave loop records
/// their results.
pub struct StepExecutor {
    tools: Arc<dyn ToolExecutor>,
}

impl StepExecutor {
    pub fn new(tools: Arc<dyn ToolExecutor>) -> Self {
        Self { tools }
    }

    /// Invoke `tool_id` with the step's effective input
    pub async fn invoke(&self, step_id: StepId, tool_id: String, input: Value) -> StepOutcome {
        tracing::info!("Invoking tool {} for step {}", tool_id, step_id);

        let start = Instant::now();
        let result = self
            .tools
            .execute(&tool_id, input)
            .await
            .map_err(|e| format!("{e:#}"));
        let duration = start.elapsed();

        match &result {
            Ok(_) => tracing::debug!("Step {} finished in {:?}", step_id, duration),
            Err(error) => tracing::warn!("Step {} failed: {}", step_id, error),
        }

        StepOutcome {
            step_id,
            result,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolDescriptor, ToolRegistry};
    use serde_json::json;

    #[tokio::test]
    async fn test_invoke_success_and_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(ToolDescriptor::new("double"), |input| async move {
            let n = input["n"].as_i64().unwrap_or_default();
            Ok(json!({ "n": n * 2 }))
        })));
        let executor = StepExecutor::new(Arc::new(registry));

        let ok = executor
            .invoke(StepId::new("a"), "double".to_string(), json!({"n": 21}))
            .await;
        assert_eq!(ok.step_id, StepId::new("a"));
        assert_eq!(ok.result.unwrap(), json!({"n": 42}));

        let missing = executor
            .invoke(StepId::new("b"), "nope".to_string(), json!({}))
            .await;
        assert_eq!(missing.result.unwrap_err(), "Tool not found: nope");
    }

    #[tokio::test]
    async fn test_failure_message_keeps_error_chain() {
        use anyhow::Context;

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(ToolDescriptor::new("lookup"), |_| async {
            Err::<Value, _>(anyhow::anyhow!("connection refused"))
                .context("Registry lookup failed")
        })));
        let executor = StepExecutor::new(Arc::new(registry));

        let outcome = executor
            .invoke(StepId::new("a"), "lookup".to_string(), json!({}))
            .await;
        assert_eq!(
            outcome.result.unwrap_err(),
            "Registry lookup failed: connection refused"
        );
    }
}
