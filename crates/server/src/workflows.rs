// Workflows served by the binary and the catalog that names them

use anyhow::{Context, Result};
use cloudhelper_arm::{CloudProvider, ResourceGroup};
use async_trait::async_trait;
use cloudhelper_core::{
    parse_with_fallback, ChatMessage, Executor, Handler, Role, RunResult, Workflow,
    WorkflowBuilder, WorkflowAgent, WorkflowContext, WorkflowOutput, WorkflowResult,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TEXT_PIPELINE: &str = "text_pipeline";
pub const RESOURCE_LOCATIONS: &str = "resource_locations";
pub const RESOURCE_LOCATIONS_CHAT: &str = "resource_locations_chat";

struct UpperCase;

#[async_trait]
impl Handler<String> for UpperCase {
    async fn handle(&self, text: String, ctx: WorkflowContext) -> Result<()> {
        ctx.send_message(text.to_uppercase()).await?;
        Ok(())
    }
}

/// Uppercase the input, then reverse it
pub fn text_pipeline() -> WorkflowResult<Workflow> {
    let upper_case =
        Executor::from_handler::<String, _>("upper_case_executor", UpperCase).sends::<String>();

    let reverse = Executor::from_fn(
        "reverse_text_executor",
        |text: String, ctx: WorkflowContext| async move {
            ctx.yield_output(text.chars().rev().collect::<String>()).await;
            anyhow::Ok(())
        },
    );

    WorkflowBuilder::new()
        .with_name("Text pipeline")
        .with_description("Uppercases text and reverses it")
        .set_start_executor(&upper_case)
        .add_edge(&upper_case, &reverse)
        .build()
}

async fn fetch_resource_groups(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    ctx: &WorkflowContext,
) -> Result<()> {
    ctx.add_event(format!(
        "Starting to fetch resource groups for subscription: {}",
        subscription_id
    ))
    .await;

    let groups = match provider.list_resource_groups(subscription_id).await {
        Ok(groups) => groups,
        Err(e) => {
            ctx.add_event(format!("Error fetching resource groups: {}", e)).await;
            return Err(e).context("Failed to fetch resource groups");
        }
    };

    ctx.add_event(format!("Found {} resource groups", groups.len()))
        .await;
    ctx.send_message(groups).await?;
    Ok(())
}

fn location_extractor() -> Executor {
    Executor::from_fn(
        "fetch_resource_group_locations",
        |groups: Vec<ResourceGroup>, ctx: WorkflowContext| async move {
            ctx.add_event(format!(
                "Processing {} resource groups for location extraction",
                groups.len()
            ))
            .await;

            let mut locations: Vec<String> = Vec::new();
            for group in &groups {
                if !group.location.is_empty() && !locations.contains(&group.location) {
                    locations.push(group.location.clone());
                }
            }

            ctx.add_event(format!("Extracted {} unique locations", locations.len()))
                .await;
            ctx.yield_output(locations).await;
            anyhow::Ok(())
        },
    )
}

fn locations_workflow(fetcher: Executor) -> WorkflowResult<Workflow> {
    let extractor = location_extractor();
    WorkflowBuilder::new()
        .with_name("Resource group fetching workflow")
        .with_description("Fetches the resource groups in a subscription and lists their locations")
        .set_start_executor(&fetcher)
        .add_edge(&fetcher, &extractor)
        .build()
}

/// Subscription id (a string) in, distinct resource group locations out
pub fn resource_locations(provider: Arc<dyn CloudProvider>) -> WorkflowResult<Workflow> {
    let fetcher = Executor::from_fn(
        "fetch_resource_groups",
        move |subscription_id: String, ctx: WorkflowContext| {
            let provider = provider.clone();
            async move { fetch_resource_groups(provider.as_ref(), subscription_id.trim(), &ctx).await }
        },
    )
    .sends::<Vec<ResourceGroup>>();

    locations_workflow(fetcher)
}

/// Same as [`resource_locations`] but driven by a chat message list
///
/// The last user message is either the bare subscription id or
/// `{"input": "<id>"}`.
pub fn resource_locations_chat(provider: Arc<dyn CloudProvider>) -> WorkflowResult<Workflow> {
    let fetcher = Executor::from_fn(
        "fetch_resource_groups",
        move |messages: Vec<ChatMessage>, ctx: WorkflowContext| {
            let provider = provider.clone();
            async move {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .context("conversation has no user message")?;
                let subscription_id = parse_with_fallback(&last.text, "input").into_value();
                fetch_resource_groups(provider.as_ref(), &subscription_id, &ctx).await
            }
        },
    )
    .sends::<Vec<ResourceGroup>>();

    locations_workflow(fetcher)
}

/// How a workflow expects its start message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A single string
    Text,
    /// A conversation whose last user message carries the input
    Chat,
}

#[derive(Clone)]
struct CatalogEntry {
    workflow: Workflow,
    input: InputKind,
}

/// Summary of a catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub input: InputKind,
    pub start_executor: String,
    pub executors: Vec<String>,
}

/// Named, prebuilt workflows
#[derive(Clone, Default)]
pub struct WorkflowCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in workflows
    pub fn standard(provider: Arc<dyn CloudProvider>) -> WorkflowResult<Self> {
        let mut catalog = Self::new();
        catalog.insert(TEXT_PIPELINE, text_pipeline()?, InputKind::Text);
        catalog.insert(
            RESOURCE_LOCATIONS,
            resource_locations(provider.clone())?,
            InputKind::Text,
        );
        catalog.insert(
            RESOURCE_LOCATIONS_CHAT,
            resource_locations_chat(provider)?,
            InputKind::Chat,
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, name: impl Into<String>, workflow: Workflow, input: InputKind) {
        self.entries
            .insert(name.into(), CatalogEntry { workflow, input });
    }

    pub fn list(&self) -> Vec<WorkflowInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| WorkflowInfo {
                name: name.clone(),
                title: entry.workflow.name().map(str::to_string),
                description: entry.workflow.description().map(str::to_string),
                input: entry.input,
                start_executor: entry.workflow.start_executor().to_string(),
                executors: entry
                    .workflow
                    .executor_ids()
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect(),
            })
            .collect()
    }

    /// Run a workflow by name, or `None` if no such workflow exists
    ///
    /// Chat workflows run behind a [`WorkflowAgent`] and also produce a reply.
    pub async fn run(&self, name: &str, input: &str) -> Option<CatalogRun> {
        let entry = self.entries.get(name)?;
        tracing::info!("Running workflow {}", name);
        let run = match entry.input {
            InputKind::Text => CatalogRun {
                run: entry.workflow.run(input.to_string()).await,
                reply: None,
            },
            InputKind::Chat => {
                let agent = WorkflowAgent::new(name, entry.workflow.clone());
                let reply = agent.run(vec![ChatMessage::user(input)]).await;
                CatalogRun {
                    reply: Some(reply.text()),
                    run: reply.run,
                }
            }
        };
        Some(run)
    }
}

/// Result of [`WorkflowCatalog::run`]
#[derive(Debug)]
pub struct CatalogRun {
    pub run: RunResult,
    /// Rendered assistant reply, for chat workflows
    pub reply: Option<String>,
}

/// JSON rendering of a yielded value
pub fn render_output(output: &WorkflowOutput) -> Value {
    if let Some(text) = output.downcast_ref::<String>() {
        return Value::String(text.clone());
    }
    if let Some(items) = output.downcast_ref::<Vec<String>>() {
        return json!(items);
    }
    if let Some(groups) = output.downcast_ref::<Vec<ResourceGroup>>() {
        return json!(groups);
    }
    if let Some(message) = output.downcast_ref::<ChatMessage>() {
        return json!(message);
    }
    if let Some(value) = output.downcast_ref::<Value>() {
        return value.clone();
    }
    json!({"unrenderable": output.tag().name()})
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudhelper_arm::{
        validate_subscription_id, ArmResult, Resource, StorageAccount, VirtualMachineProfile,
        WebApp,
    };
    use cloudhelper_core::{ExecutorId, RunStatus};

    pub(crate) const SUB: &str = "0818ef22-4784-4365-8a35-1f03e8c5e27d";

    /// Knows a fixed set of resource groups
    pub(crate) struct StubProvider;

    #[async_trait]
    impl CloudProvider for StubProvider {
        async fn list_resource_groups(&self, subscription_id: &str) -> ArmResult<Vec<ResourceGroup>> {
            validate_subscription_id(subscription_id)?;
            Ok(["eastus", "westus2", "eastus"]
                .iter()
                .enumerate()
                .map(|(i, location)| ResourceGroup {
                    id: format!("/subscriptions/{}/resourceGroups/rg-{}", SUB, i),
                    name: format!("rg-{}", i),
                    location: location.to_string(),
                })
                .collect())
        }

        async fn list_resources(&self, _: &str, _: &str) -> ArmResult<Vec<Resource>> {
            Ok(vec![])
        }

        async fn get_virtual_machine(
            &self,
            _: &str,
            _: &str,
            name: &str,
        ) -> ArmResult<VirtualMachineProfile> {
            Err(cloudhelper_arm::ArmError::InvalidInput(format!("no vm {}", name)))
        }

        async fn list_virtual_machines(&self, _: &str, _: &str) -> ArmResult<Vec<VirtualMachineProfile>> {
            Ok(vec![])
        }

        async fn list_storage_accounts(&self, _: &str, _: &str) -> ArmResult<Vec<StorageAccount>> {
            Ok(vec![])
        }

        async fn list_web_apps(&self, _: &str, _: &str) -> ArmResult<Vec<WebApp>> {
            Ok(vec![])
        }
    }

    fn provider() -> Arc<dyn CloudProvider> {
        Arc::new(StubProvider)
    }

    #[tokio::test]
    async fn test_text_pipeline() {
        let result = text_pipeline().unwrap().run("hello world".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["DLROW OLLEH"]);
        assert_eq!(result.get_final_state(), RunStatus::Completed);
        assert_eq!(result.invocations(), 2);
        assert!(result.errors().is_empty());
    }

    #[tokio::test]
    async fn test_locations_are_distinct_and_ordered() {
        let workflow = resource_locations(provider()).unwrap();
        let result = workflow.run(format!(" {} ", SUB)).await;

        // Groups are in eastus, westus2, eastus: the first occurrence of each
        // location is kept, in the order the groups were listed

        assert_eq!(
            result.outputs_of::<Vec<String>>(),
            vec![&vec!["eastus".to_string(), "westus2".to_string()]]
        );
        let messages: Vec<String> = result.events().iter().map(|e| e.message()).collect();
        assert!(messages.iter().any(|m| m.contains("Found 3 resource groups")));
        assert!(messages.iter().any(|m| m.contains("Extracted 2 unique locations")));
    }

    #[tokio::test]
    async fn test_invalid_subscription_fails_the_fetcher() {
        let result = resource_locations(provider())
            .unwrap()
            .run("nope".to_string())
            .await;

        assert_eq!(result.get_final_state(), RunStatus::Failed);
        assert_eq!(result.failed_executors(), vec![ExecutorId::from("fetch_resource_groups")]);
        assert!(result
            .events()
            .iter()
            .any(|e| e.message().contains("Error fetching resource groups")));
    }

    #[tokio::test]
    async fn test_chat_input_accepts_json_envelope_and_bare_text() {
        let workflow = resource_locations_chat(provider()).unwrap();

        let envelope = workflow
            .run(vec![ChatMessage::user(format!(r#"{{"input": "{}"}}"#, SUB))])
            .await;
        let bare = workflow.run(vec![ChatMessage::user(SUB)]).await;

        assert_eq!(envelope.get_final_state(), RunStatus::Completed);
        assert_eq!(bare.get_final_state(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_chat_input_reads_last_user_message() {
        let workflow = resource_locations_chat(provider()).unwrap();

        let result = workflow
            .run(vec![
                ChatMessage::user("not a subscription"),
                ChatMessage::user(SUB),
                ChatMessage::assistant("Looking that up now."),
            ])
            .await;

        assert_eq!(result.get_final_state(), RunStatus::Completed);

        let no_user = workflow
            .run(vec![ChatMessage::assistant(SUB)])
            .await;
        assert_eq!(no_user.get_final_state(), RunStatus::Failed);
        assert!(no_user.errors()[0].message().contains("no user message"));
    }

    #[tokio::test]
    async fn test_catalog() {
        let catalog = WorkflowCatalog::standard(provider()).unwrap();

        let names: Vec<String> = catalog.list().into_iter().map(|w| w.name).collect();
        assert_eq!(
            names,
            vec![RESOURCE_LOCATIONS, RESOURCE_LOCATIONS_CHAT, TEXT_PIPELINE]
        );
        assert!(catalog.run("missing", "x").await.is_none());

        let result = catalog.run(RESOURCE_LOCATIONS_CHAT, SUB).await.unwrap();
        let rendered: Vec<Value> = result.run.get_outputs().iter().map(render_output).collect();
        assert_eq!(rendered, vec![json!(["eastus", "westus2"])]);
        assert_eq!(result.reply.as_deref(), Some("eastus\nwestus2"));

        let text = catalog.run(TEXT_PIPELINE, "abc").await.unwrap();
        assert!(text.reply.is_none());
        assert_eq!(text.run.outputs_of::<String>(), vec!["CBA"]);
    }
}
