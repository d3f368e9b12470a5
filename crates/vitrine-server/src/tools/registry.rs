//! Tool registry
//!
//! TigerStyle: one registry for every tool the LLM may call. Unknown names
//! and handler failures become structured failure results, never panics and
//! never errors that would abort a turn.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::inference::ToolDefinition;

/// Handler function type for registered tools
///
/// `Ok` carries the tool's JSON output; `Err` carries a human-readable
/// failure reason.
pub type ToolHandler = Arc<
    dyn Fn(&Value) -> Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send>>
        + Send
        + Sync,
>;

/// A registered tool: its LLM-facing definition and its handler
#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    /// Output fed back to the LLM
    pub output: String,
    /// Whether execution succeeded
    pub success: bool,
    /// Execution time in milliseconds
    pub duration_ms: u64,
    /// Failure reason if unsuccessful
    pub error: Option<String>,
}

impl ToolExecutionResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            output: output.into(),
            success: true,
            duration_ms,
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        let error = error.into();
        Self {
            output: error.clone(),
            success: false,
            duration_ms,
            error: Some(error),
        }
    }
}

/// Registry of tools available to the answer pipeline
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub async fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) {
        let name = name.into();
        assert!(!name.is_empty(), "tool name must not be empty");

        let definition = ToolDefinition {
            name: name.clone(),
            description: description.into(),
            input_schema,
        };

        self.tools
            .write()
            .await
            .insert(name, RegisteredTool { definition, handler });
    }

    /// Get all tool definitions for the LLM
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Check if a tool exists
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool names
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool by name
    ///
    /// Unknown names are a failure result, fatal to the call but not to the
    /// pipeline; the LLM sees the failure in its second round.
    pub async fn execute(&self, name: &str, input: &Value) -> ToolExecutionResult {
        let start = std::time::Instant::now();

        assert!(!name.is_empty(), "tool name must not be empty");

        let tool = match self.tools.read().await.get(name) {
            Some(t) => t.clone(),
            None => {
                tracing::warn!(tool = %name, "tool not found");
                return ToolExecutionResult::failure(
                    format!("Tool not found: {name}"),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let outcome = (tool.handler)(input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                tracing::debug!(tool = %name, duration_ms, "tool executed");
                ToolExecutionResult::success(value.to_string(), duration_ms)
            }
            Err(reason) => {
                tracing::warn!(tool = %name, duration_ms, reason = %reason, "tool failed");
                ToolExecutionResult::failure(reason, duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_handler() -> ToolHandler {
        Arc::new(|input| {
            let input = input.clone();
            Box::pin(async move {
                let msg = input
                    .get("message")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing message".to_string())?;
                Ok(json!({ "echo": msg }))
            })
        })
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = ToolRegistry::new();
        registry
            .register(
                "echo",
                "Echo the input back",
                json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
                echo_handler(),
            )
            .await;

        assert!(registry.has_tool("echo").await);

        let result = registry.execute("echo", &json!({"message": "hi"})).await;
        assert!(result.success);
        assert!(result.output.contains("hi"));
    }

    #[tokio::test]
    async fn test_handler_error_is_failure_result() {
        let registry = ToolRegistry::new();
        registry
            .register("echo", "Echo", json!({"type": "object"}), echo_handler())
            .await;

        let result = registry.execute("echo", &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("missing message"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure_result() {
        let registry = ToolRegistry::new();

        let result = registry.execute("nonexistent", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_definitions_sorted() {
        let registry = ToolRegistry::new();
        registry
            .register("zeta", "z", json!({}), echo_handler())
            .await;
        registry
            .register("alpha", "a", json!({}), echo_handler())
            .await;

        let defs = registry.definitions().await;
        assert_eq!(defs[0].name, "alpha");
        assert_eq!(defs[1].name, "zeta");
    }
}
