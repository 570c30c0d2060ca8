use super::dag::Workflow;
use super::engine::{RunOptions, RunResult};
use super::message::{Message, WorkflowOutput};
use crate::types::{ChatMessage, RunStatus};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

type Renderer = Arc<dyn Fn(&WorkflowOutput) -> Option<String> + Send + Sync>;

/// Reply produced by [`WorkflowAgent::run`]
#[derive(Debug)]
pub struct AgentReply {
    pub messages: Vec<ChatMessage>,
    pub run: RunResult,
}

impl AgentReply {
    /// All assistant messages joined with blank lines
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Exposes a workflow whose start executor accepts `Vec<ChatMessage>` as a
/// chat agent
#[derive(Clone)]
pub struct WorkflowAgent {
    name: String,
    workflow: Workflow,
    renderers: Vec<Renderer>,
}

impl WorkflowAgent {
    pub fn new(name: impl Into<String>, workflow: Workflow) -> Self {
        Self {
            name: name.into(),
            workflow,
            renderers: vec![
                Arc::new(|o: &WorkflowOutput| o.downcast_ref::<String>().cloned()),
                Arc::new(|o: &WorkflowOutput| {
                    o.downcast_ref::<Vec<String>>().map(|items| items.join("\n"))
                }),
                Arc::new(|o: &WorkflowOutput| o.downcast_ref::<Value>().map(render_value)),
                Arc::new(|o: &WorkflowOutput| {
                    o.downcast_ref::<ChatMessage>().map(|m| m.text.clone())
                }),
            ],
        }
    }

    /// Also render outputs of type `T` as pretty JSON
    pub fn render_as<T>(mut self) -> Self
    where
        T: Any + Serialize,
    {
        self.renderers.push(Arc::new(|o: &WorkflowOutput| {
            let value = o.downcast_ref::<T>()?;
            serde_json::to_value(value).ok().map(|v| render_value(&v))
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub async fn run(&self, messages: Vec<ChatMessage>) -> AgentReply {
        self.run_with(messages, RunOptions::default()).await
    }

    pub async fn run_with(&self, messages: Vec<ChatMessage>, options: RunOptions) -> AgentReply {
        tracing::debug!("Agent {} running workflow with {} message(s)", self.name, messages.len());
        let run = self.workflow.run_with(Message::new(messages), options).await;

        let mut replies: Vec<ChatMessage> = Vec::new();
        for output in run.get_outputs() {
            match self.render(output) {
                Some(text) => replies.push(ChatMessage::assistant(text)),
                None => tracing::warn!(
                    "Agent {} cannot render output of type {} from {}",
                    self.name,
                    output.tag(),
                    output.source()
                ),
            }
        }

        if replies.is_empty() && !run.errors().is_empty() {
            let details: Vec<String> = run.errors().iter().map(|e| e.message()).collect();
            replies.push(ChatMessage::assistant(format!(
                "The workflow could not complete:\n{}",
                details.join("\n")
            )));
        } else if replies.is_empty() && run.get_final_state() == RunStatus::Cancelled {
            replies.push(ChatMessage::assistant("The workflow was cancelled."));
        }

        AgentReply {
            messages: replies,
            run,
        }
    }

    fn render(&self, output: &WorkflowOutput) -> Option<String> {
        self.renderers.iter().find_map(|render| render(output))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::WorkflowContext;
    use crate::workflow::dag::WorkflowBuilder;
    use crate::workflow::executor::Executor;

    #[derive(Clone, Serialize)]
    struct Summary {
        regions: usize,
    }

    fn last_user_text(messages: &[ChatMessage]) -> String {
        messages.last().map(|m| m.text.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_renders_string_and_list_outputs() {
        let echo = Executor::from_fn(
            "echo",
            |messages: Vec<ChatMessage>, ctx: WorkflowContext| async move {
                let text = last_user_text(&messages);
                ctx.yield_output(format!("You said: {}", text)).await;
                ctx.yield_output(vec!["eastus".to_string(), "westus".to_string()])
                    .await;
                anyhow::Ok(())
            },
        );
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&echo)
            .build()
            .unwrap();
        let agent = WorkflowAgent::new("echo", workflow);

        let reply = agent.run(vec![ChatMessage::user("hi")]).await;

        assert_eq!(reply.messages.len(), 2);
        assert_eq!(reply.messages[0].text, "You said: hi");
        assert_eq!(reply.messages[1].text, "eastus\nwestus");
        assert_eq!(reply.text(), "You said: hi\n\neastus\nwestus");
    }

    #[tokio::test]
    async fn test_registered_type_renders_as_json() {
        let count = Executor::from_fn(
            "count",
            |_: Vec<ChatMessage>, ctx: WorkflowContext| async move {
                ctx.yield_output(Summary { regions: 3 }).await;
                anyhow::Ok(())
            },
        );
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&count)
            .build()
            .unwrap();

        let plain = WorkflowAgent::new("count", workflow.clone());
        assert!(plain.run(vec![]).await.messages.is_empty());

        let agent = WorkflowAgent::new("count", workflow).render_as::<Summary>();
        let reply = agent.run(vec![]).await;
        assert!(reply.messages[0].text.contains("\"regions\": 3"));
    }

    #[tokio::test]
    async fn test_failure_without_output_is_summarised() {
        let broken = Executor::from_fn(
            "broken",
            |_: Vec<ChatMessage>, _ctx: WorkflowContext| async move {
                Err::<(), _>(anyhow::anyhow!("authorization failed"))
            },
        );
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&broken)
            .build()
            .unwrap();
        let agent = WorkflowAgent::new("broken", workflow);

        let reply = agent.run(vec![ChatMessage::user("go")]).await;

        assert_eq!(reply.run.get_final_state(), RunStatus::Failed);
        assert_eq!(reply.messages.len(), 1);
        assert!(reply.messages[0].text.contains("broken failed: authorization failed"));
    }
}
