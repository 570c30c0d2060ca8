// Per-tool human approval policy

use serde::{Deserialize, Serialize};

/// Whether a tool call must be approved by a person first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    AlwaysRequire,
    #[default]
    NeverRequire,
}

/// A pending tool call shown to the approver
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Decides on tool calls whose policy is [`ApprovalMode::AlwaysRequire`]
#[async_trait::async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, request: &ApprovalRequest) -> bool;
}

/// Approves everything; for trusted local use
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait::async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(&self, _request: &ApprovalRequest) -> bool {
        true
    }
}

/// Denies everything; used where nobody can be asked
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait::async_trait]
impl ApprovalGate for DenyAll {
    async fn approve(&self, request: &ApprovalRequest) -> bool {
        tracing::debug!("Denying call to {} (no approver available)", request.tool_name);
        false
    }
}
