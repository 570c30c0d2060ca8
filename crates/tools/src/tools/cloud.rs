// Cloud lookup tools backed by a CloudProvider

use super::approval::ApprovalMode;
use super::registry::{json_schema_object, json_schema_string, RegistryError, Tool, ToolRegistry};
use crate::functions;
use crate::protocol::{CallToolResult, ToolSchema};
use anyhow::{Context, Result};
use cloudhelper_arm::CloudProvider;
use serde::Deserialize;
use std::sync::Arc;

/// Fallbacks used when the model leaves an argument out
#[derive(Debug, Clone, Default)]
pub struct CloudDefaults {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
}

impl CloudDefaults {
    fn subscription(&self, given: Option<String>) -> Result<String> {
        given
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.subscription_id.clone())
            .context("subscription_id was not provided and no default subscription is configured")
    }

    fn resource_group(&self, given: Option<String>) -> Result<String> {
        given
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.resource_group.clone())
            .context("resource_group was not provided and no default resource group is configured")
    }
}

/// Register every cloud tool on `registry`
pub fn register_cloud_tools(
    registry: &mut ToolRegistry,
    provider: Arc<dyn CloudProvider>,
    defaults: CloudDefaults,
) -> Result<(), RegistryError> {
    let shared = Arc::new(CloudToolState { provider, defaults });

    registry.register(Arc::new(ListResourceGroupsTool(shared.clone())))?;
    registry.register(Arc::new(ResourcesInGroupTool(shared.clone())))?;
    registry.register(Arc::new(VirtualMachineProfileTool(shared.clone())))?;
    registry.register(Arc::new(ResourceGroupSummaryTool(shared.clone())))?;
    registry.register(Arc::new(VirtualMachinesStatusTool(shared.clone())))?;
    registry.register(Arc::new(StorageAccountsTool(shared.clone())))?;
    registry.register(Arc::new(AppServicesTool(shared)))?;
    Ok(())
}

struct CloudToolState {
    provider: Arc<dyn CloudProvider>,
    defaults: CloudDefaults,
}

#[derive(Debug, Deserialize)]
struct SubscriptionArgs {
    subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceGroupArgs {
    resource_group: Option<String>,
    subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VirtualMachineArgs {
    virtual_machine_name: String,
    resource_group: Option<String>,
    subscription_id: Option<String>,
}

fn subscription_property() -> serde_json::Value {
    json_schema_string("The subscription ID (a GUID). Defaults to the configured subscription.")
}

fn resource_group_property(description: &str) -> serde_json::Value {
    json_schema_string(description)
}

/// Lists the resource groups in a subscription
pub struct ListResourceGroupsTool(Arc<CloudToolState>);

#[async_trait::async_trait]
impl Tool for ListResourceGroupsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_resource_groups".to_string(),
            description: "Use this function when the user requests the resource groups in their subscription. Lists all of the available resource groups in the subscription.".to_string(),
            input_schema: json_schema_object(
                serde_json::json!({"subscription_id": subscription_property()}),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: SubscriptionArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for list_resource_groups")?;
        let subscription_id = self.0.defaults.subscription(args.subscription_id)?;

        let groups =
            functions::list_resource_groups(self.0.provider.as_ref(), &subscription_id).await;
        Ok(CallToolResult::json(&serde_json::Value::Array(groups)))
    }
}

/// Lists the resources in a resource group
pub struct ResourcesInGroupTool(Arc<CloudToolState>);

#[async_trait::async_trait]
impl Tool for ResourcesInGroupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_resources_in_resource_group".to_string(),
            description: "Lists all of the resources in a resource group. It cannot give specific information about individual resources.".to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "resource_group": resource_group_property("The resource group name for the requested resources"),
                    "subscription_id": subscription_property()
                }),
                vec!["resource_group"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: ResourceGroupArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for get_resources_in_resource_group")?;
        let subscription_id = self.0.defaults.subscription(args.subscription_id)?;
        let resource_group = self.0.defaults.resource_group(args.resource_group)?;

        let resources = functions::get_resources_in_resource_group(
            self.0.provider.as_ref(),
            &resource_group,
            &subscription_id,
        )
        .await;
        Ok(CallToolResult::json(&serde_json::Value::Array(resources)))
    }
}

/// Size, location, OS and power state of one virtual machine
pub struct VirtualMachineProfileTool(Arc<CloudToolState>);

#[async_trait::async_trait]
impl Tool for VirtualMachineProfileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_virtual_machine_profile".to_string(),
            description: "Returns basic profile information for an Azure Virtual Machine including size, location, OS type, and current status".to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "virtual_machine_name": json_schema_string("The name of the Virtual Machine"),
                    "resource_group": resource_group_property("The name of the resource group of the Virtual Machine"),
                    "subscription_id": subscription_property()
                }),
                vec!["virtual_machine_name", "resource_group"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: VirtualMachineArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for get_virtual_machine_profile")?;
        let subscription_id = self.0.defaults.subscription(args.subscription_id)?;
        let resource_group = self.0.defaults.resource_group(args.resource_group)?;

        let profile = functions::get_virtual_machine_profile(
            self.0.provider.as_ref(),
            &args.virtual_machine_name,
            &resource_group,
            &subscription_id,
        )
        .await;
        Ok(CallToolResult::json(&profile))
    }
}

macro_rules! summary_tool {
    ($tool:ident, $name:literal, $description:literal, $summarize:path) => {
        pub struct $tool(Arc<CloudToolState>);

        #[async_trait::async_trait]
        impl Tool for $tool {
            fn schema(&self) -> ToolSchema {
                ToolSchema {
                    name: $name.to_string(),
                    description: $description.to_string(),
                    input_schema: json_schema_object(
                        serde_json::json!({
                            "resource_group": resource_group_property(
                                "Name of the Azure resource group. Defaults to the configured resource group."
                            ),
                            "subscription_id": subscription_property()
                        }),
                        vec![],
                    ),
                }
            }

            async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
                let args: ResourceGroupArgs = serde_json::from_value(arguments)
                    .context(concat!("Invalid arguments for ", $name))?;
                let subscription_id = self.0.defaults.subscription(args.subscription_id)?;
                let resource_group = self.0.defaults.resource_group(args.resource_group)?;

                let text = $summarize(self.0.provider.as_ref(), &subscription_id, &resource_group).await;
                Ok(CallToolResult::text(text))
            }

            fn approval_mode(&self) -> ApprovalMode {
                ApprovalMode::NeverRequire
            }
        }
    };
}

summary_tool!(
    ResourceGroupSummaryTool,
    "list_resource_group_resources",
    "List all resources in the specified Azure resource group with type, location, status and tags.",
    functions::summarize_resources
);

summary_tool!(
    VirtualMachinesStatusTool,
    "get_virtual_machines_status",
    "Get status and details of virtual machines in the resource group.",
    functions::summarize_virtual_machines
);

summary_tool!(
    StorageAccountsTool,
    "get_storage_accounts_info",
    "Get information about storage accounts in the resource group.",
    functions::summarize_storage_accounts
);

summary_tool!(
    AppServicesTool,
    "get_app_services_info",
    "Get information about App Services in the resource group.",
    functions::summarize_app_services
);
