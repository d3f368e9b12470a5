//! Built-in tools
//!
//! Two tools ship with the server: a customer-context lookup backed by the
//! analytics service, and a product lookup backed by the knowledge proxy.

use serde_json::{json, Value};
use std::sync::Arc;

use vitrine_core::constants::CUSTOMER_CONTEXT_EVENTS_COUNT_DEFAULT;

use super::registry::{ToolHandler, ToolRegistry};
use crate::analytics::AnalyticsClient;
use crate::knowledge::{KnowledgeClient, KNOWLEDGE_TOOL_LOOKUP_PRODUCT};

/// Name of the customer-context tool
pub const TOOL_GET_CUSTOMER_CONTEXT: &str = "get_customer_context";

/// Name of the product lookup tool
pub const TOOL_LOOKUP_PRODUCT: &str = "lookup_product";

/// Register the built-in tools that have a backing collaborator configured
pub async fn register_builtin_tools(
    registry: &ToolRegistry,
    analytics: Option<Arc<dyn AnalyticsClient>>,
    knowledge: Option<Arc<dyn KnowledgeClient>>,
) {
    if let Some(analytics) = analytics {
        registry
            .register(
                TOOL_GET_CUSTOMER_CONTEXT,
                "Fetch the visitor's recent browsing events (viewed products, cart \
                 changes) to personalize the answer.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The visitor session to look up"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of events to return"
                        }
                    },
                    "required": ["session_id"]
                }),
                customer_context_handler(analytics),
            )
            .await;
    }

    if let Some(knowledge) = knowledge {
        registry
            .register(
                TOOL_LOOKUP_PRODUCT,
                "Look up a product in the store catalog by title or handle and \
                 return its availability and price.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "Product title or handle to search for"
                        }
                    },
                    "required": ["title"]
                }),
                lookup_product_handler(knowledge),
            )
            .await;
    }
}

fn customer_context_handler(analytics: Arc<dyn AnalyticsClient>) -> ToolHandler {
    Arc::new(move |input| {
        let analytics = analytics.clone();
        let input = input.clone();
        Box::pin(async move {
            let session_id = input
                .get("session_id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| "session_id is required".to_string())?
                .to_string();
            let limit = input
                .get("limit")
                .and_then(Value::as_u64)
                .map(|l| l as u32)
                .unwrap_or(CUSTOMER_CONTEXT_EVENTS_COUNT_DEFAULT);

            match analytics.recent_events(&session_id, limit).await {
                Ok(events) => Ok(json!({ "success": true, "events": events })),
                Err(e) => Err(format!("analytics lookup failed: {e}")),
            }
        })
    })
}

fn lookup_product_handler(knowledge: Arc<dyn KnowledgeClient>) -> ToolHandler {
    Arc::new(move |input| {
        let knowledge = knowledge.clone();
        let input = input.clone();
        Box::pin(async move {
            let title = input
                .get("title")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| "title is required".to_string())?
                .to_string();

            match knowledge
                .call_tool(KNOWLEDGE_TOOL_LOOKUP_PRODUCT, json!({ "title": title }))
                .await
            {
                Ok(result) => Ok(json!({ "success": true, "product": result })),
                Err(e) => Err(format!("product lookup failed: {e}")),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vitrine_core::{Error, Result};

    struct FixedAnalytics {
        events: Vec<Value>,
        fail: bool,
    }

    #[async_trait]
    impl AnalyticsClient for FixedAnalytics {
        async fn recent_events(&self, _session_id: &str, limit: u32) -> Result<Vec<Value>> {
            if self.fail {
                return Err(Error::AnalyticsFailed {
                    reason: "down".into(),
                });
            }
            Ok(self.events.iter().take(limit as usize).cloned().collect())
        }
    }

    struct FixedKnowledge;

    #[async_trait]
    impl KnowledgeClient for FixedKnowledge {
        async fn call_tool(&self, _name: &str, arguments: Value) -> Result<Value> {
            Ok(json!({ "title": arguments["title"], "in_stock": 3 }))
        }
    }

    #[tokio::test]
    async fn test_customer_context_success() {
        let registry = ToolRegistry::new();
        register_builtin_tools(
            &registry,
            Some(Arc::new(FixedAnalytics {
                events: vec![json!({"type": "page_view"})],
                fail: false,
            })),
            None,
        )
        .await;

        let result = registry
            .execute(
                TOOL_GET_CUSTOMER_CONTEXT,
                &json!({"session_id": "s1", "limit": 5}),
            )
            .await;
        assert!(result.success);
        let output: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(output["success"], true);
        assert_eq!(output["events"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_customer_context_requires_session_id() {
        let registry = ToolRegistry::new();
        register_builtin_tools(
            &registry,
            Some(Arc::new(FixedAnalytics {
                events: vec![],
                fail: false,
            })),
            None,
        )
        .await;

        let result = registry
            .execute(TOOL_GET_CUSTOMER_CONTEXT, &json!({"limit": 5}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("session_id"));
    }

    #[tokio::test]
    async fn test_customer_context_downstream_failure() {
        let registry = ToolRegistry::new();
        register_builtin_tools(
            &registry,
            Some(Arc::new(FixedAnalytics {
                events: vec![],
                fail: true,
            })),
            None,
        )
        .await;

        let result = registry
            .execute(TOOL_GET_CUSTOMER_CONTEXT, &json!({"session_id": "s1"}))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_lookup_product() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry, None, Some(Arc::new(FixedKnowledge))).await;

        let result = registry
            .execute(TOOL_LOOKUP_PRODUCT, &json!({"title": "silver bracelet"}))
            .await;
        assert!(result.success);
        let output: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(output["product"]["in_stock"], 3);
    }

    #[tokio::test]
    async fn test_unconfigured_collaborators_register_nothing() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry, None, None).await;
        assert!(registry.list().await.is_empty());
    }
}
