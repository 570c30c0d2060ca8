use crate::agent::{AzureOpenAiClient, CloudAgent, ThreadStore};
use crate::workflows::WorkflowCatalog;
use anyhow::{Context, Result};
use cloudhelper_arm::{ArmClient, CloudProvider, EnvironmentCredential, RetryConfig, DEFAULT_BASE_URL};
use cloudhelper_tools::{
    register_cloud_tools, ApprovalGate, ApprovalMode, CloudDefaults, DocsSearchTool,
    McpHttpClient, ToolRegistry, DEFAULT_DOCS_ENDPOINT, DEFAULT_DOCS_TOOL,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INSTRUCTIONS: &str = "You're an agent which helps employees understand their \
cloud environment. When listing resource groups, only show the names in a simple list format \
unless the user specifically asks for additional details like location or ID. Format resource \
group names as a simple bulleted list. For how-to questions, search the Microsoft Learn \
documentation and cite what you found. If you don't have the capabilities to perform a requested \
action, tell the user that you don't have the capabilities and who to contact to add them.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub azure: AzureConfig,

    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_description")]
    pub description: String,

    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Model round trips allowed per user message
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default)]
    pub temperature: f32,

    /// Reply sent for `/help` and to new conversation members
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_agent_name() -> String {
    "Cloud Helper Agent".to_string()
}

fn default_agent_description() -> String {
    "An agent which helps employees understand their cloud infrastructure and resources".to_string()
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

fn default_max_turns() -> usize {
    8
}

fn default_greeting() -> String {
    "Hey I'm Cloud Helper, I help you understand your cloud environment better!".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            instructions: default_instructions(),
            max_turns: default_max_turns(),
            temperature: 0.0,
            greeting: default_greeting(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// e.g. `https://my-resource.openai.azure.com/`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Chat deployment name
    #[serde(default)]
    pub deployment: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_openai_timeout() -> u64 {
    60
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            api_key: None,
            timeout_secs: default_openai_timeout(),
        }
    }
}

impl OpenAiConfig {
    /// Endpoint, deployment and key are all present
    pub fn is_complete(&self) -> bool {
        self.endpoint.is_some() && self.deployment.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Default subscription for tools and workflows
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Default resource group for the summary tools
    #[serde(default)]
    pub resource_group: Option<String>,

    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    #[serde(default = "default_azure_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_management_endpoint() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_azure_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            resource_group: None,
            management_endpoint: default_management_endpoint(),
            timeout_secs: default_azure_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3978
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-tool approval overrides, keyed by tool name
    #[serde(default)]
    pub approval: BTreeMap<String, ApprovalMode>,

    #[serde(default)]
    pub docs: DocsToolConfig,
}

/// Documentation search over a remote MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsToolConfig {
    #[serde(default = "default_docs_enabled")]
    pub enabled: bool,

    #[serde(default = "default_docs_endpoint")]
    pub endpoint: String,

    /// Tool on the remote server that answers searches
    #[serde(default = "default_docs_tool")]
    pub remote_tool: String,

    #[serde(default = "default_docs_timeout")]
    pub timeout_secs: u64,
}

fn default_docs_enabled() -> bool {
    true
}

fn default_docs_endpoint() -> String {
    DEFAULT_DOCS_ENDPOINT.to_string()
}

fn default_docs_tool() -> String {
    DEFAULT_DOCS_TOOL.to_string()
}

fn default_docs_timeout() -> u64 {
    30
}

impl Default for DocsToolConfig {
    fn default() -> Self {
        Self {
            enabled: default_docs_enabled(),
            endpoint: default_docs_endpoint(),
            remote_tool: default_docs_tool(),
            timeout_secs: default_docs_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load the TOML file (defaults when absent) and apply environment overrides
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!(
                "Configuration file {} not found, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("AZURE_OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(endpoint) = get("AZURE_OPENAI_ENDPOINT") {
            self.openai.endpoint = Some(endpoint);
        }
        if let Some(deployment) = get("AZURE_OPENAI_CHAT_DEPLOYMENT_NAME") {
            self.openai.deployment = Some(deployment);
        }
        if let Some(subscription) = get("AZURE_SUBSCRIPTION_ID") {
            self.azure.subscription_id = Some(subscription);
        }
        if let Some(resource_group) = get("AZURE_RESOURCE_GROUP_NAME") {
            self.azure.resource_group = Some(resource_group);
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        }
        Ok(())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub tools: Arc<ToolRegistry>,
    /// Absent when the chat provider is not configured
    pub agent: Option<Arc<CloudAgent>>,
    pub threads: ThreadStore,
    pub workflows: WorkflowCatalog,
}

impl AppState {
    pub fn new(config: ServerConfig, gate: Arc<dyn ApprovalGate>) -> Result<Self> {
        let provider = build_provider(&config)?;
        Self::with_provider(config, provider, gate)
    }

    pub fn with_provider(
        config: ServerConfig,
        provider: Arc<dyn CloudProvider>,
        gate: Arc<dyn ApprovalGate>,
    ) -> Result<Self> {
        let tools = Arc::new(build_registry(&config, provider.clone())?);
        let workflows =
            WorkflowCatalog::standard(provider).context("Failed to build workflows")?;

        let agent = if config.openai.is_complete() {
            Some(Arc::new(build_agent(&config, tools.clone(), gate)?))
        } else {
            tracing::warn!(
                "Chat provider is not configured; set AZURE_OPENAI_API_KEY, \
                 AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_CHAT_DEPLOYMENT_NAME"
            );
            None
        };

        Ok(Self {
            config,
            tools,
            agent,
            threads: ThreadStore::new(),
            workflows,
        })
    }
}

/// Management plane client authenticated from the environment
pub fn build_provider(config: &ServerConfig) -> Result<Arc<dyn CloudProvider>> {
    let retry = RetryConfig {
        max_retries: config.azure.max_retries,
        ..Default::default()
    };
    let client = ArmClient::builder()
        .base_url(config.azure.management_endpoint.clone())
        .credential(Arc::new(EnvironmentCredential))
        .timeout(Duration::from_secs(config.azure.timeout_secs))
        .retry_config(retry)
        .build()
        .context("Failed to create management client")?;
    Ok(Arc::new(client))
}

/// Cloud and documentation tools with the configured approval overrides applied
pub fn build_registry(
    config: &ServerConfig,
    provider: Arc<dyn CloudProvider>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let defaults = CloudDefaults {
        subscription_id: config.azure.subscription_id.clone(),
        resource_group: config.azure.resource_group.clone(),
    };
    register_cloud_tools(&mut registry, provider, defaults)?;

    let docs = &config.tools.docs;
    if docs.enabled {
        let client = McpHttpClient::new(&docs.endpoint, Duration::from_secs(docs.timeout_secs))
            .with_context(|| format!("Invalid [tools.docs] endpoint '{}'", docs.endpoint))?;
        registry.register(Arc::new(DocsSearchTool::new(
            Arc::new(client),
            docs.remote_tool.clone(),
        )))?;
    }

    for (name, mode) in &config.tools.approval {
        registry
            .set_approval_mode(name, *mode)
            .with_context(|| format!("Invalid [tools.approval] entry '{}'", name))?;
    }
    Ok(registry)
}

fn build_agent(
    config: &ServerConfig,
    tools: Arc<ToolRegistry>,
    gate: Arc<dyn ApprovalGate>,
) -> Result<CloudAgent> {
    let openai = &config.openai;
    let (Some(endpoint), Some(deployment), Some(api_key)) =
        (&openai.endpoint, &openai.deployment, &openai.api_key)
    else {
        anyhow::bail!("chat provider configuration is incomplete");
    };

    let client = AzureOpenAiClient::new(
        endpoint,
        deployment,
        &openai.api_version,
        api_key.clone(),
        Duration::from_secs(openai.timeout_secs),
    )
    .context("Failed to create chat client")?;

    Ok(CloudAgent::new(
        &config.agent,
        Arc::new(client),
        tools,
        gate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_with_env(&dir.path().join("absent.toml"), no_env).unwrap();

        assert_eq!(config.server.port, 3978);
        assert_eq!(config.agent.max_turns, 8);
        assert_eq!(config.azure.management_endpoint, DEFAULT_BASE_URL);
        assert!(!config.openai.is_complete());
    }

    #[test]
    fn test_file_sections_are_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[agent]
max_turns = 3

[azure]
subscription_id = "0818ef22-4784-4365-8a35-1f03e8c5e27d"

[server]
host = "0.0.0.0"

[tools.approval]
get_virtual_machine_profile = "always_require"

[tools.docs]
endpoint = "http://localhost:9000/mcp"
"#
        )
        .unwrap();

        let config = ServerConfig::load_with_env(file.path(), no_env).unwrap();

        assert_eq!(config.agent.max_turns, 3);
        assert_eq!(config.agent.name, "Cloud Helper Agent");
        assert_eq!(config.server.addr(), "0.0.0.0:3978");
        assert_eq!(
            config.tools.approval.get("get_virtual_machine_profile"),
            Some(&ApprovalMode::AlwaysRequire)
        );
        assert!(config.tools.docs.enabled);
        assert_eq!(config.tools.docs.endpoint, "http://localhost:9000/mcp");
        assert_eq!(config.tools.docs.remote_tool, DEFAULT_DOCS_TOOL);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[azure]\nresource_group = \"rg-file\"").unwrap();

        let env: HashMap<&str, &str> = [
            ("AZURE_RESOURCE_GROUP_NAME", "rg-env"),
            ("AZURE_OPENAI_API_KEY", "key"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com/"),
            ("AZURE_OPENAI_CHAT_DEPLOYMENT_NAME", "gpt-4o"),
            ("PORT", "8090"),
        ]
        .into_iter()
        .collect();

        let config =
            ServerConfig::load_with_env(file.path(), |k| env.get(k).map(|v| v.to_string()))
                .unwrap();

        assert_eq!(config.azure.resource_group.as_deref(), Some("rg-env"));
        assert_eq!(config.server.port, 8090);
        assert!(config.openai.is_complete());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerConfig::load_with_env(&dir.path().join("none.toml"), |k| {
            (k == "PORT").then(|| "eighty".to_string())
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_approval_override_is_rejected() {
        let mut config = ServerConfig::default();
        config
            .tools
            .approval
            .insert("no_such_tool".to_string(), ApprovalMode::AlwaysRequire);
        let provider = build_provider(&ServerConfig::default()).unwrap();

        let err = build_registry(&config, provider).err().expect("expected build_registry to fail");
        assert!(err.to_string().contains("no_such_tool"));
    }

    #[test]
    fn test_approval_override_is_applied() {
        let mut config = ServerConfig::default();
        config.tools.approval.insert(
            "list_resource_groups".to_string(),
            ApprovalMode::AlwaysRequire,
        );
        let provider = build_provider(&config).unwrap();

        let registry = build_registry(&config, provider).unwrap();
        assert_eq!(
            registry.approval_mode("list_resource_groups"),
            Some(ApprovalMode::AlwaysRequire)
        );
        assert_eq!(
            registry.approval_mode("get_virtual_machine_profile"),
            Some(ApprovalMode::NeverRequire)
        );
    }

    #[test]
    fn test_docs_tool_follows_config() {
        let mut config = ServerConfig::default();
        let provider = build_provider(&config).unwrap();

        let registry = build_registry(&config, provider.clone()).unwrap();
        assert!(registry.contains("search_microsoft_learn"));
        assert_eq!(registry.len(), 8);

        config.tools.docs.enabled = false;
        let registry = build_registry(&config, provider.clone()).unwrap();
        assert!(!registry.contains("search_microsoft_learn"));

        config.tools.docs.enabled = true;
        config.tools.docs.endpoint = "not a url".to_string();
        let err = build_registry(&config, provider).err().expect("expected build_registry to fail");
        assert!(err.to_string().contains("[tools.docs]"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = ServerConfig::default();
        config.openai.api_key = Some("secret".to_string());

        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
    }
}
