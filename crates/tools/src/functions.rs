// Cloud lookups exposed to the chat agent
//
// None of these return an error: a failed call becomes a structured
// `{"error": ...}` value or an explanatory sentence the model can relay.

use cloudhelper_arm::{ArmError, CloudProvider};
use serde_json::{json, Value};
use std::fmt::Write;

/// `[{id, name, location}]`, or a single `{"error"}` element on failure
pub async fn list_resource_groups(provider: &dyn CloudProvider, subscription_id: &str) -> Vec<Value> {
    match provider.list_resource_groups(subscription_id).await {
        Ok(groups) => groups
            .into_iter()
            .map(|g| json!({"id": g.id, "name": g.name, "location": g.location}))
            .collect(),
        Err(e) => {
            tracing::warn!("Listing resource groups in {} failed: {}", subscription_id, e);
            vec![json!({
                "error": format!(
                    "An error occurred trying to get resource groups in {}: {}",
                    subscription_id, e
                )
            })]
        }
    }
}

/// `[{name, type, location, kind, id}]`, or a single `{"error"}` element
pub async fn get_resources_in_resource_group(
    provider: &dyn CloudProvider,
    resource_group: &str,
    subscription_id: &str,
) -> Vec<Value> {
    match provider.list_resources(subscription_id, resource_group).await {
        Ok(resources) => resources
            .into_iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "type": r.resource_type,
                    "location": r.location,
                    "kind": r.kind,
                    "id": r.id,
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Listing resources in {} failed: {}", resource_group, e);
            vec![json!({"error": format!("Error listing resources in {}: {}", resource_group, e)})]
        }
    }
}

/// VM profile object, or `{"error", "vm_name"}`
pub async fn get_virtual_machine_profile(
    provider: &dyn CloudProvider,
    vm_name: &str,
    resource_group: &str,
    subscription_id: &str,
) -> Value {
    match provider
        .get_virtual_machine(subscription_id, resource_group, vm_name)
        .await
    {
        Ok(profile) => serde_json::to_value(profile).unwrap_or_else(|e| {
            json!({"error": format!("Failed to encode VM profile: {}", e), "vm_name": vm_name})
        }),
        Err(e) => {
            tracing::warn!("Reading VM {} failed: {}", vm_name, e);
            json!({"error": format!("Failed to get VM profile: {}", e), "vm_name": vm_name})
        }
    }
}

fn describe_error(action: &str, error: &ArmError) -> String {
    match error {
        ArmError::Api { .. } => format!("Azure API error: {}", error),
        _ => format!("Error {}: {}", action, error),
    }
}

/// Markdown summary of the resources in a resource group
pub async fn summarize_resources(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    resource_group: &str,
) -> String {
    let resources = match provider.list_resources(subscription_id, resource_group).await {
        Ok(resources) => resources,
        Err(e) => return describe_error("listing resources", &e),
    };
    if resources.is_empty() {
        return format!("No resources found in resource group '{}'", resource_group);
    }

    let mut out = format!(
        "Found {} resources in '{}':\n\n",
        resources.len(),
        resource_group
    );
    for resource in &resources {
        let _ = writeln!(out, "**{}**", resource.name);
        let _ = writeln!(out, "  - Type: {}", resource.resource_type);
        let _ = writeln!(
            out,
            "  - Location: {}",
            resource.location.as_deref().unwrap_or("Unknown")
        );
        let _ = writeln!(
            out,
            "  - Status: {}",
            resource.provisioning_state.as_deref().unwrap_or("Unknown")
        );
        if !resource.tags.is_empty() {
            let tags: Vec<String> = resource
                .tags
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let _ = writeln!(out, "  - Tags: {}", tags.join(", "));
        }
        out.push('\n');
    }
    out
}

/// Markdown summary of virtual machines and their power state
pub async fn summarize_virtual_machines(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    resource_group: &str,
) -> String {
    let vms = match provider
        .list_virtual_machines(subscription_id, resource_group)
        .await
    {
        Ok(vms) => vms,
        Err(e) => return describe_error("getting VM status", &e),
    };
    if vms.is_empty() {
        return format!(
            "No virtual machines found in resource group '{}'",
            resource_group
        );
    }

    let mut out = format!(
        "Found {} virtual machines in '{}':\n\n",
        vms.len(),
        resource_group
    );
    for vm in &vms {
        let _ = writeln!(out, "**{}**", vm.name);
        let _ = writeln!(out, "  - Size: {}", vm.size);
        let _ = writeln!(out, "  - OS: {}", vm.os_type);
        let _ = writeln!(out, "  - Location: {}", vm.location);
        let _ = writeln!(out, "  - Power State: {}\n", vm.power_state);
    }
    out
}

/// Markdown summary of storage accounts
pub async fn summarize_storage_accounts(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    resource_group: &str,
) -> String {
    let accounts = match provider
        .list_storage_accounts(subscription_id, resource_group)
        .await
    {
        Ok(accounts) => accounts,
        Err(e) => return describe_error("getting storage accounts", &e),
    };
    if accounts.is_empty() {
        return format!(
            "No storage accounts found in resource group '{}'",
            resource_group
        );
    }

    let mut out = format!(
        "Found {} storage accounts in '{}':\n\n",
        accounts.len(),
        resource_group
    );
    for account in &accounts {
        let _ = writeln!(out, "**{}**", account.name);
        let _ = writeln!(out, "  - SKU: {}", account.sku);
        let _ = writeln!(out, "  - Kind: {}", account.kind);
        let _ = writeln!(out, "  - Location: {}", account.location);
        let _ = writeln!(out, "  - Status: {}", account.provisioning_state);
        if let Some(blob) = &account.primary_endpoints.blob {
            let _ = writeln!(out, "  - Blob Endpoint: {}", blob);
        }
        out.push('\n');
    }
    out
}

/// Markdown summary of App Services
pub async fn summarize_app_services(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    resource_group: &str,
) -> String {
    let apps = match provider.list_web_apps(subscription_id, resource_group).await {
        Ok(apps) => apps,
        Err(e) => return describe_error("getting App Services", &e),
    };
    if apps.is_empty() {
        return format!("No App Services found in resource group '{}'", resource_group);
    }

    let mut out = format!(
        "Found {} App Services in '{}':\n\n",
        apps.len(),
        resource_group
    );
    for app in &apps {
        let _ = writeln!(out, "**{}**", app.name);
        if let Some(host) = &app.default_host_name {
            let _ = writeln!(out, "  - URL: https://{}", host);
        }
        let _ = writeln!(out, "  - State: {}", app.state);
        let _ = writeln!(out, "  - Location: {}", app.location);
        let _ = writeln!(out, "  - App Service Plan: {}", app.app_service_plan);
        let _ = writeln!(out, "  - Runtime: {}\n", app.runtime_stack);
    }
    out
}
