//! The cloud resource provider seam.

use crate::error::{ArmError, ArmResult};
use crate::models::{ResourceGroup, Resource, StorageAccount, VirtualMachineProfile, WebApp};
use async_trait::async_trait;

/// Read-only view of a cloud subscription.
///
/// Every call is fallible; callers that face a chat surface turn the error
/// into a structured value instead of propagating it.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn list_resource_groups(&self, subscription_id: &str) -> ArmResult<Vec<ResourceGroup>>;

    async fn list_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<Resource>>;

    async fn get_virtual_machine(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vm_name: &str,
    ) -> ArmResult<VirtualMachineProfile>;

    /// Virtual machines in a resource group, with power state
    async fn list_virtual_machines(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<VirtualMachineProfile>>;

    async fn list_storage_accounts(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<StorageAccount>>;

    async fn list_web_apps(&self, subscription_id: &str, resource_group: &str)
        -> ArmResult<Vec<WebApp>>;
}

/// Subscription ids are GUIDs; anything else is rejected before a request.
pub fn validate_subscription_id(subscription_id: &str) -> ArmResult<&str> {
    let trimmed = subscription_id.trim();
    uuid::Uuid::parse_str(trimmed).map_err(|_| {
        ArmError::InvalidInput(format!(
            "'{}' is not a valid subscription id",
            subscription_id
        ))
    })?;
    Ok(trimmed)
}

/// Resource names become path segments: no separators, no dot segments.
pub fn validate_name<'a>(kind: &str, name: &'a str) -> ArmResult<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ArmError::InvalidInput(format!("{} name is empty", kind)));
    }
    if matches!(trimmed, "." | "..") {
        return Err(ArmError::InvalidInput(format!(
            "'{}' is not a valid {} name",
            name, kind
        )));
    }
    if trimmed.contains(['/', '\\', '?', '#']) || trimmed.chars().any(char::is_control) {
        return Err(ArmError::InvalidInput(format!(
            "{} name '{}' contains an invalid character",
            kind, name
        )));
    }
    Ok(trimmed)
}
