//! Resource models returned by the provider.
//!
//! Public types are flat summaries. The `*Wire` types mirror the nested
//! management-plane JSON and are converted with `From`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN: &str = "Unknown";

/// A resource group in a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// A generic resource inside a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: Option<String>,
    pub kind: Option<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// Basic profile of a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineProfile {
    #[serde(rename = "vm_name")]
    pub name: String,
    #[serde(rename = "vm_size")]
    pub size: String,
    pub location: String,
    pub os_type: String,
    pub power_state: String,
    pub provisioning_state: String,
    pub resource_group: String,
}

/// Endpoints of a storage account's services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpoints {
    pub blob: Option<String>,
    pub file: Option<String>,
    pub queue: Option<String>,
    pub table: Option<String>,
}

/// A storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    pub name: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub provisioning_state: String,
    pub primary_endpoints: StorageEndpoints,
}

/// An App Service web app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebApp {
    pub name: String,
    pub location: String,
    pub state: String,
    pub default_host_name: Option<String>,
    pub app_service_plan: String,
    pub runtime_stack: String,
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceGroupWire {
    id: String,
    name: String,
    location: String,
}

impl From<ResourceGroupWire> for ResourceGroup {
    fn from(wire: ResourceGroupWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            location: wire.location,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceWire {
    id: String,
    name: String,
    #[serde(rename = "type")]
    resource_type: String,
    location: Option<String>,
    kind: Option<String>,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
    provisioning_state: Option<String>,
}

impl From<ResourceWire> for Resource {
    fn from(wire: ResourceWire) -> Self {
        Self {
            name: wire.name,
            resource_type: wire.resource_type,
            location: wire.location,
            kind: wire.kind,
            id: wire.id,
            tags: wire.tags.unwrap_or_default(),
            provisioning_state: wire.provisioning_state,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceStatus {
    code: Option<String>,
    display_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InstanceView {
    #[serde(default)]
    statuses: Vec<InstanceStatus>,
}

impl InstanceView {
    /// Display status of the `PowerState/*` entry.
    pub(crate) fn power_state(&self) -> String {
        self.statuses
            .iter()
            .filter(|s| {
                s.code
                    .as_deref()
                    .is_some_and(|code| code.starts_with("PowerState/"))
            })
            .find_map(|s| s.display_status.clone())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardwareProfile {
    vm_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OsProfile {
    linux_configuration: Option<serde_json::Value>,
    windows_configuration: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OsDisk {
    os_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfile {
    os_disk: Option<OsDisk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualMachineProperties {
    #[serde(default)]
    hardware_profile: HardwareProfile,
    os_profile: Option<OsProfile>,
    #[serde(default)]
    storage_profile: StorageProfile,
    provisioning_state: Option<String>,
    instance_view: Option<InstanceView>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VirtualMachineWire {
    pub(crate) name: String,
    location: String,
    #[serde(default)]
    properties: VirtualMachineProperties,
}

impl VirtualMachineWire {
    pub(crate) fn os_type(&self) -> String {
        if let Some(profile) = &self.properties.os_profile {
            if profile.linux_configuration.is_some() {
                return "Linux".to_string();
            }
            if profile.windows_configuration.is_some() {
                return "Windows".to_string();
            }
        }
        self.properties
            .storage_profile
            .os_disk
            .as_ref()
            .and_then(|disk| disk.os_type.clone())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Profile using the embedded instance view, or `instance_view` when given.
    pub(crate) fn into_profile(
        self,
        resource_group: &str,
        instance_view: Option<InstanceView>,
    ) -> VirtualMachineProfile {
        let os_type = self.os_type();
        let power_state = instance_view
            .as_ref()
            .or(self.properties.instance_view.as_ref())
            .map(InstanceView::power_state)
            .unwrap_or_else(|| UNKNOWN.to_string());

        VirtualMachineProfile {
            name: self.name,
            size: self
                .properties
                .hardware_profile
                .vm_size
                .unwrap_or_else(|| UNKNOWN.to_string()),
            location: self.location,
            os_type,
            power_state,
            provisioning_state: self
                .properties
                .provisioning_state
                .unwrap_or_else(|| UNKNOWN.to_string()),
            resource_group: resource_group.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Sku {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageAccountProperties {
    provisioning_state: Option<String>,
    primary_endpoints: Option<StorageEndpoints>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageAccountWire {
    name: String,
    location: String,
    #[serde(default)]
    sku: Sku,
    kind: Option<String>,
    #[serde(default)]
    properties: StorageAccountProperties,
}

impl From<StorageAccountWire> for StorageAccount {
    fn from(wire: StorageAccountWire) -> Self {
        Self {
            name: wire.name,
            location: wire.location,
            sku: wire.sku.name.unwrap_or_else(|| UNKNOWN.to_string()),
            kind: wire.kind.unwrap_or_else(|| UNKNOWN.to_string()),
            provisioning_state: wire
                .properties
                .provisioning_state
                .unwrap_or_else(|| UNKNOWN.to_string()),
            primary_endpoints: wire.properties.primary_endpoints.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteConfig {
    linux_fx_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebAppProperties {
    state: Option<String>,
    default_host_name: Option<String>,
    server_farm_id: Option<String>,
    site_config: Option<SiteConfig>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebAppWire {
    name: String,
    location: String,
    #[serde(default)]
    properties: WebAppProperties,
}

impl From<WebAppWire> for WebApp {
    fn from(wire: WebAppWire) -> Self {
        let properties = wire.properties;
        let app_service_plan = properties
            .server_farm_id
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .filter(|plan| !plan.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();
        let runtime_stack = properties
            .site_config
            .and_then(|config| config.linux_fx_version)
            .filter(|stack| !stack.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            name: wire.name,
            location: wire.location,
            state: properties.state.unwrap_or_else(|| UNKNOWN.to_string()),
            default_host_name: properties.default_host_name,
            app_service_plan,
            runtime_stack,
        }
    }
}
