use super::{ApiError, ApiResult};
use crate::config::AppState;
use crate::workflows::{render_output, WorkflowInfo};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cloudhelper_core::{RunId, RunStatus, WorkflowEvent};
use cloudhelper_tools::ApprovalMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Answers the channel registration check
pub async fn messages_ready() -> StatusCode {
    StatusCode::OK
}

/// Party in a messaging activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
}

/// Incoming messaging activity
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<ChannelAccount>,
    #[serde(default)]
    pub recipient: Option<ChannelAccount>,
    #[serde(default)]
    pub conversation: Option<ConversationAccount>,
    #[serde(default)]
    pub members_added: Vec<ChannelAccount>,
}

/// Reply activity returned to the channel
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyActivity {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
}

impl ReplyActivity {
    fn to(activity: &Activity, text: impl Into<String>) -> Self {
        Self {
            kind: "message",
            text: text.into(),
            reply_to_id: activity.id.clone(),
            conversation: activity.conversation.clone(),
            from: activity.recipient.clone(),
            recipient: activity.from.clone(),
        }
    }
}

/// Handle a messaging activity and answer it inline
pub async fn post_activity(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<Activity>,
) -> Response {
    match activity.kind.as_str() {
        "conversationUpdate" => {
            let bot_id = activity.recipient.as_ref().map(|r| r.id.as_str());
            let greets_someone = activity
                .members_added
                .iter()
                .any(|member| Some(member.id.as_str()) != bot_id);
            if greets_someone {
                let reply = ReplyActivity::to(&activity, state.config.agent.greeting.clone());
                return Json(reply).into_response();
            }
            StatusCode::ACCEPTED.into_response()
        }
        "message" => {
            let text = activity.text.clone().unwrap_or_default();
            let answer = answer_message(&state, &activity, text.trim()).await;
            Json(ReplyActivity::to(&activity, answer)).into_response()
        }
        other => {
            tracing::debug!("Ignoring activity of type {}", other);
            StatusCode::ACCEPTED.into_response()
        }
    }
}

async fn answer_message(state: &AppState, activity: &Activity, text: &str) -> String {
    let user_id = activity
        .from
        .as_ref()
        .map(|f| f.id.clone())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    match text {
        "/help" => return state.config.agent.greeting.clone(),
        "/reset" => {
            state.threads.forget(&user_id).await;
            return "Starting a new conversation.".to_string();
        }
        _ => {}
    }

    let Some(agent) = state.agent.as_ref() else {
        return "Sorry, I encountered an error: the chat provider is not configured".to_string();
    };
    tracing::debug!("{} answering {}", agent.name(), user_id);

    let thread = state.threads.thread(&user_id).await;
    let mut history = thread.lock().await;
    match agent.respond(&mut history, text).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Error answering {}: {}", user_id, e);
            format!("Sorry, I encountered an error: {}", e)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListWorkflowsResponse {
    pub workflows: Vec<WorkflowInfo>,
}

/// List the workflow catalog
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<ListWorkflowsResponse> {
    Json(ListWorkflowsResponse {
        workflows: state.workflows.list(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RunWorkflowRequest {
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct RunWorkflowResponse {
    pub workflow: String,
    pub run_id: RunId,
    pub status: RunStatus,
    pub outputs: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    pub failed_executors: Vec<String>,
    pub events: Vec<WorkflowEvent>,
}

/// Run a workflow from the catalog to completion
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<RunWorkflowRequest>,
) -> ApiResult<Json<RunWorkflowResponse>> {
    if req.input.trim().is_empty() {
        return Err(ApiError::bad_request(anyhow::anyhow!("input must not be empty")));
    }

    let result = state
        .workflows
        .run(&name, &req.input)
        .await
        .ok_or_else(|| ApiError::not_found(anyhow::anyhow!("Workflow '{}' not found", name)))?;

    let run = result.run;
    tracing::info!(
        "Workflow {} finished: run_id={}, status={}",
        name,
        run.run_id,
        run.get_final_state()
    );

    Ok(Json(RunWorkflowResponse {
        workflow: name,
        run_id: run.run_id,
        status: run.get_final_state(),
        outputs: run.get_outputs().iter().map(render_output).collect(),
        reply: result.reply,
        failed_executors: run
            .failed_executors()
            .into_iter()
            .map(|id| id.to_string())
            .collect(),
        events: run.events().to_vec(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub approval_mode: ApprovalMode,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Registered tools with their effective approval policy
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ListToolsResponse> {
    let tools = state
        .tools
        .list_schemas()
        .into_iter()
        .map(|schema| ToolInfo {
            approval_mode: state
                .tools
                .approval_mode(&schema.name)
                .unwrap_or_default(),
            name: schema.name,
            description: schema.description,
            parameters: schema.input_schema,
        })
        .collect();
    Json(ListToolsResponse { tools })
}
