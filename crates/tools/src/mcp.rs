// Streamable-HTTP client for remote MCP tool servers

use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, PeerInfo, RemoteCallResult, RemoteTool, MCP_PROTOCOL_VERSION,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// User agent sent to remote tool servers
pub const USER_AGENT: &str = "Cloud-Helper-Agent/1.0";

const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid MCP endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("MCP server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("MCP error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("invalid MCP response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Session {
    id: Option<String>,
}

/// Client for one MCP server reached over streamable HTTP
///
/// The session is opened lazily on the first call and reopened once when
/// the server reports it as unknown.
pub struct McpHttpClient {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
    session: Mutex<Option<Session>>,
}

impl McpHttpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, McpError> {
        let endpoint = Url::parse(endpoint)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
            session: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Every tool the server offers, following list cursors
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(cursor) => serde_json::json!({ "cursor": cursor }),
                None => serde_json::json!({}),
            };
            let page: ListToolsResult = self.call("tools/list", params).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<RemoteCallResult, McpError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        self.call("tools/call", params).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, McpError> {
        let session = self.session().await?;
        match self.request(method, params.clone(), session.id.as_deref()).await {
            Err(McpError::Status { status: 404, .. }) if session.id.is_some() => {
                tracing::info!("MCP session at {} expired, reconnecting", self.endpoint);
                *self.session.lock().await = None;
                let session = self.session().await?;
                self.request(method, params, session.id.as_deref()).await
            }
            other => other,
        }
    }

    async fn session(&self) -> Result<Session, McpError> {
        let mut current = self.session.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }

        let session = self.initialize().await?;
        *current = Some(session.clone());
        Ok(session)
    }

    async fn initialize(&self) -> Result<Session, McpError> {
        let params = serde_json::to_value(InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: PeerInfo {
                name: "cloudhelper".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })?;
        let id = self.next_id();
        let response = self
            .post(&JsonRpcRequest::new(id, "initialize", params), None)
            .await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let result: InitializeResult = read_result(response, id).await?;

        tracing::debug!(
            "Opened MCP session with {} {} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );

        self.post(
            &JsonRpcRequest::notification("notifications/initialized"),
            session_id.as_deref(),
        )
        .await?;

        Ok(Session { id: session_id })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<T, McpError> {
        let id = self.next_id();
        let response = self
            .post(&JsonRpcRequest::new(id, method, params), session_id)
            .await?;
        read_result(response, id).await
    }

    async fn post(&self, message: &JsonRpcRequest, session_id: Option<&str>) -> Result<Response, McpError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Status { status, body });
        }
        Ok(response)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for McpHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpHttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

async fn read_result<T: DeserializeOwned>(response: Response, id: u64) -> Result<T, McpError> {
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    let body = response.text().await?;

    let message = if is_event_stream {
        find_in_event_stream(&body, id)?
    } else {
        serde_json::from_str::<JsonRpcResponse>(&body)?
    };

    if let Some(error) = message.error {
        return Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    let result = message
        .result
        .ok_or_else(|| McpError::InvalidResponse("neither result nor error".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

/// The response to request `id` among the events of an SSE body
fn find_in_event_stream(body: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
    let mut data = String::new();

    // A trailing empty line flushes an event the body did not terminate
    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() {
                if let Ok(message) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    if message.id == Value::from(id) {
                        return Ok(message);
                    }
                }
                data.clear();
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    Err(McpError::InvalidResponse(format!(
        "no response to request {} in event stream",
        id
    )))
}
