// Simulated tools standing in for the external services a deployment would call

use crate::config::SimulationConfig;
use anyhow::anyhow;
use eva_core::tools::{FnTool, ToolDescriptor, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Register a simulated tool for every id: it waits the configured latency
/// and echoes its input, or fails if the id is listed as failing.
pub fn simulated_registry<I>(tool_ids: I, simulation: &SimulationConfig) -> ToolRegistry
where
    I: IntoIterator<Item = String>,
{
    let mut registry = ToolRegistry::new();
    let latency = Duration::from_millis(simulation.latency_ms);

    for id in tool_ids {
        let fails = simulation.failing_tools.contains(&id);
        let tool_id = id.clone();
        registry.register(Arc::new(FnTool::new(
            ToolDescriptor::new(id).with_description("Simulated tool"),
            move |inputs| {
                let tool_id = tool_id.clone();
                async move {
                    tokio::time::sleep(latency).await;
                    if fails {
                        return Err(anyhow!("Simulated failure in tool {}", tool_id));
                    }
                    Ok(json!({ "tool": tool_id, "inputs": inputs }))
                }
            },
        )));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use eva_core::tools::ToolExecutor;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_tools_echo_and_fail() {
        let simulation = SimulationConfig {
            latency_ms: 100,
            failing_tools: vec!["credit-report".to_string()],
        };
        let registry = simulated_registry(
            ["entity-search".to_string(), "credit-report".to_string()],
            &simulation,
        );

        assert_eq!(registry.len(), 2);

        let output = registry
            .execute("entity-search", json!({"query": "Acme"}))
            .await
            .unwrap();
        assert_eq!(
            output,
            json!({"tool": "entity-search", "inputs": {"query": "Acme"}})
        );

        let err = registry
            .execute("credit-report", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Simulated failure in tool credit-report");
    }
}
