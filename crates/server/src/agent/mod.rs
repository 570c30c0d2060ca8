// Chat agent: a model, the tool registry and per-user conversation threads

pub mod llm;

use crate::config::AgentConfig;
use cloudhelper_core::ChatMessage;
use cloudhelper_tools::{ApprovalGate, ToolRegistry};
use llm::{ChatClient, ChatRequest};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub use llm::AzureOpenAiClient;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response from chat provider: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no answer after {0} turns")]
    MaxTurnsExceeded(usize),
}

/// Tool-using chat agent
pub struct CloudAgent {
    name: String,
    instructions: String,
    temperature: f32,
    max_turns: usize,
    client: Arc<dyn ChatClient>,
    tools: Arc<ToolRegistry>,
    gate: Arc<dyn ApprovalGate>,
}

impl CloudAgent {
    pub fn new(
        config: &AgentConfig,
        client: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        gate: Arc<dyn ApprovalGate>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            instructions: config.instructions.clone(),
            temperature: config.temperature,
            max_turns: config.max_turns.max(1),
            client,
            tools,
            gate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer `utterance`, extending `history` with the exchange
    ///
    /// `history` is only updated when an answer is produced, so a failed
    /// turn leaves the thread as it was.
    pub async fn respond(
        &self,
        history: &mut Vec<ChatMessage>,
        utterance: &str,
    ) -> Result<String, AgentError> {
        let mut working = history.clone();
        working.push(ChatMessage::user(utterance));
        let schemas = self.tools.list_schemas();

        for turn in 0..self.max_turns {
            let mut messages = Vec::with_capacity(working.len() + 1);
            messages.push(ChatMessage::system(self.instructions.clone()));
            messages.extend(working.iter().cloned());

            let reply = self
                .client
                .complete(ChatRequest {
                    messages,
                    tools: schemas.clone(),
                    temperature: self.temperature,
                })
                .await?;

            if reply.tool_calls.is_empty() {
                let answer = reply.text.clone();
                working.push(reply);
                *history = working;
                return Ok(answer);
            }

            tracing::debug!(
                "Agent {} turn {}: {} tool call(s)",
                self.name,
                turn + 1,
                reply.tool_calls.len()
            );
            let calls = reply.tool_calls.clone();
            working.push(reply);

            for call in calls {
                let result = self
                    .tools
                    .invoke(&call.name, call.arguments.clone(), self.gate.as_ref())
                    .await;
                if result.is_error() {
                    tracing::warn!("Tool {} returned an error", call.name);
                }
                working.push(ChatMessage::tool_result(call.id, result.text_content()));
            }
        }

        Err(AgentError::MaxTurnsExceeded(self.max_turns))
    }
}

type Thread = Arc<Mutex<Vec<ChatMessage>>>;

/// In-memory conversation threads keyed by user id
#[derive(Clone, Default)]
pub struct ThreadStore {
    threads: Arc<Mutex<HashMap<String, Thread>>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's thread, created on first use
    pub async fn thread(&self, user_id: &str) -> Thread {
        let mut threads = self.threads.lock().await;
        threads
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Drop the user's thread; the next message starts a new one
    pub async fn forget(&self, user_id: &str) -> bool {
        self.threads.lock().await.remove(user_id).is_some()
    }
}
