// Tool registry and the tool-invocation capability the executor depends on

use crate::types::ToolCategory;
use anyhow::{anyhow, Result};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Invokes a tool by its opaque id
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute the tool with the given inputs, returning its result payload
    async fn execute(&self, tool_id: &str, inputs: Value) -> Result<Value>;
}

/// Describes a registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: ToolCategory,
}

impl ToolDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            category: ToolCategory::Other,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A single tool implementation
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, inputs: Value) -> Result<Value>;
}

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by an async closure
pub struct FnTool {
    descriptor: ToolDescriptor,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            descriptor,
            handler: Box::new(move |inputs| handler(inputs).boxed()),
        }
    }
}

#[async_trait::async_trait]
impl Tool for FnTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn call(&self, inputs: Value) -> Result<Value> {
        (self.handler)(inputs).await
    }
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same id
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        self.tools.insert(descriptor.id, tool);
    }

    /// Get a tool by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Check if a tool exists
    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// List all tool descriptors, sorted by id
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_id: &str, inputs: Value) -> Result<Value> {
        let tool = self
            .get(tool_id)
            .ok_or_else(|| anyhow!("Tool not found: {}", tool_id))?;

        tracing::debug!("Invoking tool {}", tool_id);
        tool.call(inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(id: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            ToolDescriptor::new(id).with_category(ToolCategory::Search),
            |inputs| async move { Ok(json!({ "echo": inputs })) },
        ))
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_id() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("search"));

        assert!(registry.contains("search"));
        assert_eq!(registry.len(), 1);

        let result = registry
            .execute("search", json!({"q": "acme"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": {"q": "acme"}}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: missing");
    }

    #[tokio::test]
    async fn test_fn_tool_propagates_errors() {
        let tool = FnTool::new(ToolDescriptor::new("flaky"), |_| async {
            Err::<Value, _>(anyhow!("upstream unavailable"))
        });
        let err = tool.call(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "upstream unavailable");
    }

    #[test]
    fn test_descriptors_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("zeta"));
        registry.register(echo_tool("alpha"));
        registry.register(echo_tool("alpha"));

        let ids: Vec<_> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert_eq!(registry.descriptors()[0].category, ToolCategory::Search);
    }
}
