// Tool registry: capability name -> implementation, validated at registration

use super::approval::{ApprovalGate, ApprovalMode, ApprovalRequest};
use crate::protocol::{CallToolResult, ToolSchema};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema advertised to the chat provider
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult>;

    /// Whether a human must approve each call
    fn approval_mode(&self) -> ApprovalMode {
        ApprovalMode::NeverRequire
    }
}

/// Registration and lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,

    #[error("a tool named '{0}' is already registered")]
    DuplicateName(String),

    #[error("tool '{name}' has an invalid input schema: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    approval_overrides: HashMap<String, ApprovalMode>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            approval_overrides: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let schema = tool.schema();
        validate_schema(&schema)?;
        if self.tools.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateName(schema.name));
        }

        tracing::debug!("Registered tool {}", schema.name);
        self.tools.insert(schema.name, tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// List all tool schemas, sorted by name
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Override the approval policy the tool declares
    pub fn set_approval_mode(&mut self, name: &str, mode: ApprovalMode) -> Result<(), RegistryError> {
        if !self.tools.contains_key(name) {
            return Err(RegistryError::UnknownTool(name.to_string()));
        }
        self.approval_overrides.insert(name.to_string(), mode);
        Ok(())
    }

    /// Effective approval policy of a tool
    pub fn approval_mode(&self, name: &str) -> Option<ApprovalMode> {
        let tool = self.tools.get(name)?;
        Some(
            self.approval_overrides
                .get(name)
                .copied()
                .unwrap_or_else(|| tool.approval_mode()),
        )
    }

    /// Run a tool by name, honoring its approval policy
    ///
    /// Every failure, including an unknown name, a denied approval, a tool
    /// error or a panic inside the tool, comes back as an error result.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
        gate: &dyn ApprovalGate,
    ) -> CallToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!("Requested unknown tool {}", name);
            return CallToolResult::error(RegistryError::UnknownTool(name.to_string()).to_string());
        };

        if self.approval_mode(name) == Some(ApprovalMode::AlwaysRequire) {
            let request = ApprovalRequest {
                tool_name: name.to_string(),
                arguments: arguments.clone(),
            };
            if !gate.approve(&request).await {
                tracing::info!("Call to tool {} was not approved", name);
                return CallToolResult::error(format!("call to '{}' was not approved", name));
            }
        }

        tracing::debug!("Invoking tool {}", name);
        // Run on its own task so a panicking tool cannot unwind into the caller
        let task = tokio::spawn(async move { tool.execute(arguments).await });
        match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!("Tool {} failed: {:#}", name, e);
                CallToolResult::error(format!("{:#}", e))
            }
            Err(panic) => {
                tracing::error!("Tool {} panicked: {}", name, panic);
                CallToolResult::error(format!("tool '{}' panicked", name))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_schema(schema: &ToolSchema) -> Result<(), RegistryError> {
    if schema.name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if schema.input_schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err(RegistryError::InvalidSchema {
            name: schema.name.clone(),
            reason: "arguments must be described by an object schema".to_string(),
        });
    }
    Ok(())
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: serde_json::Value, required: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}
