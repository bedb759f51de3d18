//! Tools offered to the model by this application.

use async_trait::async_trait;
use atelier_conversation::{ToolDefinition, ToolError, ToolExecutor, ToolRegistry};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;

const CLOUD_RESOURCES: &str = "get_cloud_resources";

/// Builds the registry of application tools.
#[must_use]
pub fn application_tools(client: reqwest::Client, inventory_url: Option<String>) -> ToolRegistry {
    ToolRegistry::new().with_tool(Arc::new(CloudResourcesTool::new(client, inventory_url)))
}

/// Reads the cloud resource inventory from an external JSON endpoint.
///
/// The inventory is opaque: whatever JSON the endpoint returns is handed to
/// the model as-is, stamped with the time it was fetched.
#[derive(Debug, Clone)]
pub struct CloudResourcesTool {
    client: reqwest::Client,
    inventory_url: Option<String>,
    timeout: Duration,
}

impl CloudResourcesTool {
    #[must_use]
    pub fn new(client: reqwest::Client, inventory_url: Option<String>) -> Self {
        Self {
            client,
            inventory_url: inventory_url.filter(|url| !url.trim().is_empty()),
            timeout: Duration::from_secs(10),
        }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            name: CLOUD_RESOURCES.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ToolExecutor for CloudResourcesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            CLOUD_RESOURCES,
            "List the cloud resources (buckets, instances, functions, databases) available \
             in the user's account. Use this before writing code that depends on them.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "service": {
                    "type": "string",
                    "description": "Only return resources of this service, e.g. \"s3\" or \"lambda\"."
                }
            }
        }))
    }

    async fn execute(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let Some(url) = &self.inventory_url else {
            return Err(Self::failed("cloud resource inventory is not configured"));
        };
        if !input.is_object() {
            return Err(ToolError::InvalidInput {
                name: CLOUD_RESOURCES.to_string(),
                reason: "expected a JSON object".to_string(),
            });
        }

        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(service) = input.get("service").and_then(JsonValue::as_str) {
            request = request.query(&[("service", service)]);
        }
        let response = request.send().await.map_err(|e| Self::failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(format!("inventory returned HTTP {}", status.as_u16())));
        }
        let resources: JsonValue = response
            .json()
            .await
            .map_err(|e| Self::failed(format!("inventory is not JSON: {e}")))?;

        Ok(json!({
            "fetchedAt": Utc::now().to_rfc3339(),
            "resources": resources,
        }))
    }
}
