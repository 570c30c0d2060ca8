// Tools exposed to the chat agent: a validated registry, per-tool approval
// policy, the cloud lookups and documentation search over MCP.

pub mod functions;
pub mod mcp;
pub mod protocol;
pub mod tools;

pub use mcp::{McpError, McpHttpClient};
pub use protocol::{CallToolResult, ToolContent, ToolSchema};
pub use tools::{
    register_cloud_tools, ApprovalGate, ApprovalMode, ApprovalRequest, AutoApprove, CloudDefaults,
    DenyAll, DocsSearchTool, DEFAULT_DOCS_ENDPOINT, DEFAULT_DOCS_TOOL, RegistryError, Tool, ToolRegistry,
};
