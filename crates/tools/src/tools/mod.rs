pub mod approval;
pub mod cloud;
pub mod docs;
mod registry;

pub use approval::{ApprovalGate, ApprovalMode, ApprovalRequest, AutoApprove, DenyAll};
pub use cloud::{
    register_cloud_tools, AppServicesTool, CloudDefaults, ListResourceGroupsTool,
    ResourceGroupSummaryTool, ResourcesInGroupTool, StorageAccountsTool,
    VirtualMachineProfileTool, VirtualMachinesStatusTool,
};
pub use docs::{DocsSearchTool, DEFAULT_DOCS_ENDPOINT, DEFAULT_DOCS_TOOL};
pub use registry::{json_schema_object, json_schema_string, RegistryError, Tool, ToolRegistry};
