//! Azure Resource Manager client.

use crate::config::{ArmConfig, RetryConfig, DEFAULT_BASE_URL};
use crate::credential::TokenCredential;
use crate::error::{ArmError, ArmResult};
use crate::models::{
    InstanceView, Resource, ResourceGroup, ResourceGroupWire, ResourceWire, StorageAccount,
    StorageAccountWire, VirtualMachineProfile, VirtualMachineWire, WebApp, WebAppWire,
};
use crate::provider::{validate_name, validate_subscription_id, CloudProvider};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const RESOURCES_API_VERSION: &str = "2021-04-01";
const COMPUTE_API_VERSION: &str = "2024-07-01";
const STORAGE_API_VERSION: &str = "2023-05-01";
const WEB_API_VERSION: &str = "2023-12-01";

/// [`CloudProvider`] backed by the management REST API.
#[derive(Debug, Clone)]
pub struct ArmClient {
    http: HttpTransport,
}

impl ArmClient {
    /// Create a new client builder.
    pub fn builder() -> ArmClientBuilder {
        ArmClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ArmConfig, credential: Arc<dyn TokenCredential>) -> ArmResult<Self> {
        let http = HttpTransport::new(Arc::new(config), credential)?;
        Ok(Self { http })
    }

    fn resource_group_path<'a>(
        subscription_id: &'a str,
        resource_group: &'a str,
        rest: &[&'a str],
    ) -> Vec<&'a str> {
        let mut segments = vec!["subscriptions", subscription_id, "resourceGroups", resource_group];
        segments.extend_from_slice(rest);
        segments
    }

    async fn instance_view(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vm_name: &str,
    ) -> ArmResult<InstanceView> {
        let path = Self::resource_group_path(
            subscription_id,
            resource_group,
            &["providers", "Microsoft.Compute", "virtualMachines", vm_name, "instanceView"],
        );
        self.http
            .get(&path, &[("api-version", COMPUTE_API_VERSION)])
            .await
    }
}

#[async_trait]
impl CloudProvider for ArmClient {
    async fn list_resource_groups(&self, subscription_id: &str) -> ArmResult<Vec<ResourceGroup>> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let path = ["subscriptions", subscription_id, "resourcegroups"];

        let groups: Vec<ResourceGroupWire> = self
            .http
            .get_all(&path, &[("api-version", RESOURCES_API_VERSION)])
            .await?;

        tracing::debug!(
            "Listed {} resource groups in subscription {}",
            groups.len(),
            subscription_id
        );
        Ok(groups.into_iter().map(ResourceGroup::from).collect())
    }

    async fn list_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<Resource>> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let resource_group = validate_name("resource group", resource_group)?;
        let path = Self::resource_group_path(subscription_id, resource_group, &["resources"]);

        let resources: Vec<ResourceWire> = self
            .http
            .get_all(
                &path,
                &[
                    ("api-version", RESOURCES_API_VERSION),
                    ("$expand", "provisioningState"),
                ],
            )
            .await?;

        Ok(resources.into_iter().map(Resource::from).collect())
    }

    async fn get_virtual_machine(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vm_name: &str,
    ) -> ArmResult<VirtualMachineProfile> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let resource_group = validate_name("resource group", resource_group)?;
        let vm_name = validate_name("virtual machine", vm_name)?;
        let path = Self::resource_group_path(
            subscription_id,
            resource_group,
            &["providers", "Microsoft.Compute", "virtualMachines", vm_name],
        );

        let vm: VirtualMachineWire = self
            .http
            .get(
                &path,
                &[
                    ("api-version", COMPUTE_API_VERSION),
                    ("$expand", "instanceView"),
                ],
            )
            .await?;

        Ok(vm.into_profile(resource_group, None))
    }

    async fn list_virtual_machines(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<VirtualMachineProfile>> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let resource_group = validate_name("resource group", resource_group)?;
        let path = Self::resource_group_path(
            subscription_id,
            resource_group,
            &["providers", "Microsoft.Compute", "virtualMachines"],
        );

        let vms: Vec<VirtualMachineWire> = self
            .http
            .get_all(&path, &[("api-version", COMPUTE_API_VERSION)])
            .await?;

        // The list operation omits power state; fetch each instance view
        let mut profiles = Vec::with_capacity(vms.len());
        for vm in vms {
            let view = match self
                .instance_view(subscription_id, resource_group, &vm.name)
                .await
            {
                Ok(view) => Some(view),
                Err(e) => {
                    tracing::warn!("Could not read instance view of {}: {}", vm.name, e);
                    None
                }
            };
            profiles.push(vm.into_profile(resource_group, view));
        }

        Ok(profiles)
    }

    async fn list_storage_accounts(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<StorageAccount>> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let resource_group = validate_name("resource group", resource_group)?;
        let path = Self::resource_group_path(
            subscription_id,
            resource_group,
            &["providers", "Microsoft.Storage", "storageAccounts"],
        );

        let accounts: Vec<StorageAccountWire> = self
            .http
            .get_all(&path, &[("api-version", STORAGE_API_VERSION)])
            .await?;

        Ok(accounts.into_iter().map(StorageAccount::from).collect())
    }

    async fn list_web_apps(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ArmResult<Vec<WebApp>> {
        let subscription_id = validate_subscription_id(subscription_id)?;
        let resource_group = validate_name("resource group", resource_group)?;
        let path = Self::resource_group_path(
            subscription_id,
            resource_group,
            &["providers", "Microsoft.Web", "sites"],
        );

        let apps: Vec<WebAppWire> = self
            .http
            .get_all(&path, &[("api-version", WEB_API_VERSION)])
            .await?;

        Ok(apps.into_iter().map(WebApp::from).collect())
    }
}

/// Builder for creating an [`ArmClient`].
pub struct ArmClientBuilder {
    base_url: Option<String>,
    credential: Option<Arc<dyn TokenCredential>>,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl ArmClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            credential: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
        }
    }

    /// Override the management endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the token source.
    pub fn credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> ArmResult<ArmClient> {
        let credential = self
            .credential
            .ok_or_else(|| ArmError::Config("a credential is required".to_string()))?;
        let base_url = Url::parse(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let config = ArmConfig {
            base_url,
            timeout: self.timeout,
            retry_config: self.retry_config,
        };

        ArmClient::from_config(config, credential)
    }
}

impl Default for ArmClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUB: &str = "0818ef22-4784-4365-8a35-1f03e8c5e27d";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::builder()
            .base_url(server.uri())
            .credential(Arc::new(StaticTokenCredential::new("token")))
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_resource_groups() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
            .and(query_param("api-version", RESOURCES_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/subscriptions/x/resourceGroups/rg-web", "name": "rg-web", "location": "eastus", "properties": {"provisioningState": "Succeeded"}},
                    {"id": "/subscriptions/x/resourceGroups/rg-data", "name": "rg-data", "location": "westus2"}
                ]
            })))
            .mount(&server)
            .await;

        let groups = client(&server).list_resource_groups(SUB).await.unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "rg-web");
        assert_eq!(groups[1].location, "westus2");
    }

    #[tokio::test]
    async fn test_invalid_subscription_never_hits_the_network() {
        let server = MockServer::start().await;

        let err = client(&server)
            .list_resource_groups("definitely-not-a-guid")
            .await
            .unwrap_err();

        assert!(matches!(err, ArmError::InvalidInput(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_resources_in_group() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourceGroups/rg-web/resources", SUB)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "/subscriptions/x/resourceGroups/rg-web/providers/Microsoft.Web/sites/portal",
                    "name": "portal",
                    "type": "Microsoft.Web/sites",
                    "location": "eastus",
                    "kind": "app,linux",
                    "tags": {"env": "prod"},
                    "provisioningState": "Succeeded"
                }]
            })))
            .mount(&server)
            .await;

        let resources = client(&server).list_resources(SUB, "rg-web").await.unwrap();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_type, "Microsoft.Web/sites");
        assert_eq!(resources[0].kind.as_deref(), Some("app,linux"));
        assert_eq!(resources[0].tags.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_get_virtual_machine_expands_instance_view() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-01",
                SUB
            )))
            .and(query_param("$expand", "instanceView"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web-01",
                "location": "eastus",
                "properties": {
                    "hardwareProfile": {"vmSize": "Standard_D2s_v5"},
                    "osProfile": {"windowsConfiguration": {}},
                    "provisioningState": "Succeeded",
                    "instanceView": {"statuses": [{"code": "PowerState/deallocated", "displayStatus": "VM deallocated"}]}
                }
            })))
            .mount(&server)
            .await;

        let profile = client(&server)
            .get_virtual_machine(SUB, "rg-web", "web-01")
            .await
            .unwrap();

        assert_eq!(profile.os_type, "Windows");
        assert_eq!(profile.power_state, "VM deallocated");
        assert_eq!(profile.size, "Standard_D2s_v5");
    }

    #[tokio::test]
    async fn test_list_virtual_machines_reads_each_instance_view() {
        let server = MockServer::start().await;
        let base = format!(
            "/subscriptions/{}/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines",
            SUB
        );

        Mock::given(method("GET"))
            .and(path(base.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"name": "a", "location": "eastus", "properties": {"storageProfile": {"osDisk": {"osType": "Linux"}}}},
                    {"name": "b", "location": "eastus", "properties": {}}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/a/instanceView", base)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statuses": [{"code": "PowerState/running", "displayStatus": "VM running"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/b/instanceView", base)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let vms = client(&server)
            .list_virtual_machines(SUB, "rg-web")
            .await
            .unwrap();

        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].power_state, "VM running");
        assert_eq!(vms[0].os_type, "Linux");
        assert_eq!(vms[1].power_state, "Unknown");
    }

    #[tokio::test]
    async fn test_list_storage_accounts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/resourceGroups/rg-data/providers/Microsoft.Storage/storageAccounts",
                SUB
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "name": "logs",
                    "location": "eastus",
                    "sku": {"name": "Standard_LRS"},
                    "kind": "StorageV2",
                    "properties": {
                        "provisioningState": "Succeeded",
                        "primaryEndpoints": {"blob": "https://logs.blob.core.windows.net/"}
                    }
                }]
            })))
            .mount(&server)
            .await;

        let accounts = client(&server)
            .list_storage_accounts(SUB, "rg-data")
            .await
            .unwrap();

        assert_eq!(accounts[0].sku, "Standard_LRS");
        assert_eq!(
            accounts[0].primary_endpoints.blob.as_deref(),
            Some("https://logs.blob.core.windows.net/")
        );
    }

    #[tokio::test]
    async fn test_list_web_apps() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/resourceGroups/rg-web/providers/Microsoft.Web/sites",
                SUB
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "name": "portal",
                    "location": "eastus",
                    "properties": {"state": "Stopped", "defaultHostName": "portal.azurewebsites.net"}
                }]
            })))
            .mount(&server)
            .await;

        let apps = client(&server).list_web_apps(SUB, "rg-web").await.unwrap();

        assert_eq!(apps[0].state, "Stopped");
        assert_eq!(apps[0].app_service_plan, "Unknown");
        assert_eq!(apps[0].runtime_stack, "Unknown");
    }

    #[tokio::test]
    async fn test_dot_segment_group_never_widens_the_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resources", SUB)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "other-rg-vm", "type": "Microsoft.Compute/virtualMachines", "location": "eastus"}]
            })))
            .mount(&server)
            .await;

        for group in ["..", ".", " .. "] {
            let err = client(&server).list_resources(SUB, group).await.unwrap_err();
            assert!(matches!(err, ArmError::InvalidInput(_)), "{:?}", group);
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_names_are_percent_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        client(&server).list_resources(SUB, "rg web(1)").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            requests[0].url.path(),
            format!("/subscriptions/{}/resourceGroups/rg%20web(1)/resources", SUB)
        );
    }

    #[test]
    fn test_builder_requires_credential() {
        let result = ArmClient::builder().build();
        assert!(matches!(result, Err(ArmError::Config(_))));
    }
}
