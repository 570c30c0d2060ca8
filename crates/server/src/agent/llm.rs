// Chat completion provider
//
// Talks to an Azure OpenAI chat deployment. Tool schemas are advertised as
// OpenAI function tools; tool calls come back with JSON-encoded arguments.

use super::AgentError;
use async_trait::async_trait;
use cloudhelper_core::{ChatMessage, Role, ToolCall};
use cloudhelper_tools::ToolSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// One completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
}

/// A chat model that may answer with text or with tool calls
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage, AgentError>;
}

/// Azure OpenAI chat completions client
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    url: Url,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        if deployment.trim().is_empty() {
            return Err(AgentError::Config("deployment name is empty".to_string()));
        }
        let base = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{}/", endpoint))?
        };
        let mut url = base.join(&format!(
            "openai/deployments/{}/chat/completions",
            deployment.trim()
        ))?;
        url.query_pairs_mut().append_pair("api-version", api_version);

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url,
            api_key: api_key.into(),
        })
    }
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url.as_str())
            .finish()
    }
}

#[async_trait]
impl ChatClient for AzureOpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage, AgentError> {
        let body = CompletionRequest {
            messages: request.messages.iter().map(OaiMessage::from).collect(),
            tools: request.tools.iter().map(OaiTool::from).collect(),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            temperature: request.temperature,
        };

        tracing::debug!(
            "Requesting completion with {} message(s) and {} tool(s)",
            body.messages.len(),
            body.tools.len()
        );

        let response = self
            .http
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OaiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(AgentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::InvalidResponse("completion has no choices".to_string()))?;

        Ok(choice.message.into_chat_message())
    }
}

// Wire types

#[derive(Serialize)]
struct CompletionRequest {
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OaiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for OaiMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let content = if message.text.is_empty() && !message.tool_calls.is_empty() {
            None
        } else {
            Some(message.text.clone())
        };

        Self {
            role,
            content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OaiToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: OaiFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct OaiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OaiFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug)]
struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct OaiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolSchema,
}

impl From<&ToolSchema> for OaiTool {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            kind: "function",
            function: schema.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

impl ResponseMessage {
    fn into_chat_message(self) -> ChatMessage {
        let text = self.content.unwrap_or_default();
        if self.tool_calls.is_empty() {
            return ChatMessage::assistant(text);
        }

        let calls = self
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = if call.function.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                        tracing::warn!(
                            "Tool call {} has malformed arguments: {}",
                            call.function.name,
                            e
                        );
                        serde_json::Value::String(call.function.arguments.clone())
                    })
                };
                ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();
        ChatMessage::assistant_tool_calls(text, calls)
    }
}

#[derive(Deserialize)]
struct OaiErrorEnvelope {
    error: OaiErrorBody,
}

#[derive(Deserialize)]
struct OaiErrorBody {
    message: String,
}
