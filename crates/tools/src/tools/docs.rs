// Documentation search backed by a remote MCP server

use super::registry::{json_schema_object, json_schema_string, Tool};
use crate::mcp::McpHttpClient;
use crate::protocol::{CallToolResult, ToolSchema};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Microsoft Learn MCP endpoint
pub const DEFAULT_DOCS_ENDPOINT: &str = "https://learn.microsoft.com/api/mcp";

/// Remote tool that answers search queries
pub const DEFAULT_DOCS_TOOL: &str = "microsoft_docs_search";

/// Answers how-to questions from official documentation
pub struct DocsSearchTool {
    client: Arc<McpHttpClient>,
    remote_tool: String,
    /// Argument the remote tool reads the query from, learned from `tools/list`
    query_argument: OnceCell<String>,
}

impl DocsSearchTool {
    pub fn new(client: Arc<McpHttpClient>, remote_tool: impl Into<String>) -> Self {
        Self {
            client,
            remote_tool: remote_tool.into(),
            query_argument: OnceCell::new(),
        }
    }

    async fn query_argument(&self) -> Result<&str> {
        let argument = self
            .query_argument
            .get_or_try_init(|| async move {
                let tools = self
                    .client
                    .list_tools()
                    .await
                    .with_context(|| format!("Could not list tools at {}", self.client.endpoint()))?;
                let Some(tool) = tools.iter().find(|t| t.name == self.remote_tool) else {
                    let available: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                    anyhow::bail!(
                        "documentation server does not offer '{}' (available: {})",
                        self.remote_tool,
                        available.join(", ")
                    );
                };
                Ok::<_, anyhow::Error>(query_property(&tool.input_schema))
            })
            .await?;
        Ok(argument.as_str())
    }
}

/// First required string property of a schema, `query` when there is none
fn query_property(schema: &Value) -> String {
    let properties = schema.get("properties");
    schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|name| {
            properties
                .and_then(|p| p.get(*name))
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
                == Some("string")
        })
        .unwrap_or("query")
        .to_string()
}

#[derive(Debug, Deserialize)]
struct DocsArgs {
    question: String,
}

#[async_trait::async_trait]
impl Tool for DocsSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_microsoft_learn".to_string(),
            description: "Search official Microsoft Learn documentation. Use this for how-to \
                questions about Azure services, the Azure CLI and configuration."
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "question": json_schema_string(
                        "What to look up, e.g. 'create a storage account with the Azure CLI'"
                    )
                }),
                vec!["question"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: DocsArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for search_microsoft_learn")?;
        let question = args.question.trim();
        if question.is_empty() {
            return Ok(CallToolResult::error("question must not be empty"));
        }

        let argument = self.query_argument().await?;
        let mut remote_arguments = serde_json::Map::new();
        remote_arguments.insert(argument.to_string(), Value::String(question.to_string()));

        let result = self
            .client
            .call_tool(&self.remote_tool, Value::Object(remote_arguments))
            .await
            .context("Documentation search failed")?;

        let text = result.text();
        if result.is_error {
            return Ok(CallToolResult::error(text));
        }
        if text.is_empty() {
            return Ok(CallToolResult::text(format!(
                "No documentation found for '{}'",
                question
            )));
        }
        Ok(CallToolResult::text(text))
    }
}
