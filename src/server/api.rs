use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ Path, State };
use axum::http::{ header, StatusCode };
use axum::response::Response;
use axum::{ Extension, Json };
use log::{ error, info };
use serde::Deserialize;
use serde_json::{ json, Value };

use super::auth::AuthUser;
use super::error::ApiError;
use super::stream::chat_body;
use super::{ AppState, AGENT_TYPE_HEADER, CONVERSATION_ID_HEADER };
use crate::agents::{ profile, AGENT_PROFILES };
use crate::markers::parse_message_markers;
use crate::models::chat::{ AgentKind, ChatMessage, HistoryMessage, MessageRole };
use crate::models::routing::RouterResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Vec<HistoryMessage>,
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(b)| b).map_err(|rejection| ApiError::validation("body", rejection.body_text()))
}

/// Blank messages are rejected; accepted ones are used exactly as sent.
fn require_message(message: &str) -> Result<&str, ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::validation("message", "Message is required"));
    }
    Ok(message)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(
        json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "ai": {
            "provider": state.ai.provider.to_string(),
            "models": {
                "router": state.ai.router_model,
                "agent": state.ai.agent_model,
            }
        }
    })
    )
}

pub async fn list_agents() -> Json<Value> {
    let agents: Vec<Value> = AGENT_PROFILES.iter()
        .map(|p| json!({ "type": p.kind.as_str(), "name": p.name, "description": p.description }))
        .collect();
    Json(json!({ "agents": agents }))
}

pub async fn agent_capabilities(Path(kind): Path<String>) -> Result<Json<Value>, ApiError> {
    let kind: AgentKind = kind.parse().map_err(|_| ApiError::not_found("Unknown agent type"))?;
    let p = profile(kind);
    Ok(
        Json(
            json!({
        "type": p.kind.as_str(),
        "name": p.name,
        "description": p.description,
        "capabilities": p.capabilities,
    })
        )
    )
}

pub async fn classify(
    State(state): State<AppState>,
    body: Result<Json<ClassifyBody>, JsonRejection>
) -> Result<Json<RouterResult>, ApiError> {
    let body = parse_body(body)?;
    let message = require_message(&body.message)?;
    Ok(Json(state.chat.router().classify(message, &body.context).await))
}

/// Streams the reply as plain text. Routing happens before the response
/// starts so the agent can be reported in a header.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SendMessageBody>, JsonRejection>
) -> Result<Response, ApiError> {
    let body = parse_body(body)?;
    let message = require_message(&body.message)?;

    let processed = state.chat.send_message(&user.user_id, message, body.conversation_id.as_deref()).await?;
    info!(
        "Streaming {} agent reply for conversation {}",
        processed.agent_type,
        processed.conversation_id
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(CONVERSATION_ID_HEADER, processed.conversation_id.as_str())
        .header(AGENT_TYPE_HEADER, processed.agent_type.as_str())
        .body(Body::from_stream(chat_body(processed.text_stream, processed.agent_type)))
        .map_err(|e| {
            error!("Failed to build chat response: {}", e);
            ApiError::internal()
        })
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>
) -> Result<Json<Value>, ApiError> {
    let conversations = state.chat.list_conversations(&user.user_id).await?;
    Ok(Json(json!({ "conversations": conversations })))
}

fn message_view(message: &ChatMessage) -> Value {
    let mut view = json!(message);
    if message.role == MessageRole::Assistant {
        view["parsed"] = json!(parse_message_markers(&message.content));
    }
    view
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>
) -> Result<Json<Value>, ApiError> {
    let (conversation, messages) = state.chat.conversation_messages(&id, &user.user_id).await?;
    let messages: Vec<Value> = messages.iter().map(message_view).collect();
    Ok(Json(json!({ "conversation": conversation, "messages": messages })))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>
) -> Result<Json<Value>, ApiError> {
    state.chat.delete_conversation(&id, &user.user_id).await?;
    Ok(Json(json!({ "success": true })))
}
