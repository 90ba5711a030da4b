pub mod ollama;
pub mod openai;
pub mod rllm_backend;
pub mod sse;

use async_trait::async_trait;
use futures::{ Future, Stream };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmError, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use self::rllm_backend::RllmChatClient;
use crate::models::chat::{ HistoryMessage, MessageRole };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
    Tool,
}

impl PromptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
            PromptRole::Tool => "tool",
        }
    }
}

impl From<MessageRole> for PromptRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => PromptRole::User,
            MessageRole::Assistant => PromptRole::Assistant,
            MessageRole::System => PromptRole::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Model-facing description of a callable tool. `parameters` is a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
}

impl PromptMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(PromptRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(PromptRole::User, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(PromptRole::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::new(PromptRole::Tool, content)
        }
    }
}

impl From<&HistoryMessage> for PromptMessage {
    fn from(msg: &HistoryMessage) -> Self {
        PromptMessage::new(msg.role.into(), msg.content.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether and which tool to call each step.
    #[default]
    Auto,
    None,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self { messages, ..Default::default() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// One item of a streamed model step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepChunk {
    Text(String),
    ToolCall(ToolCall),
}

pub type StepStream = Pin<Box<dyn Stream<Item = Result<StepChunk, LlmError>> + Send>>;

/// Lazy, single-pass sequence of reply fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Runs a single model step, streaming text deltas and any requested tool calls.
    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError>;

    fn model(&self) -> String;
    fn provider(&self) -> LlmType;

    fn supports_tools(&self) -> bool {
        true
    }
}

pub fn create_streaming_response<T, F, Fut>(response_fn: F) -> Pin<Box<dyn Stream<Item = T> + Send>>
    where
        T: Send + 'static,
        F: FnOnce(mpsc::Sender<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Adapts a provider that only answers in one piece into a step stream.
pub fn full_response_as_stream<F, Fut>(response_fn: F) -> StepStream
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, LlmError>> + Send + 'static
{
    create_streaming_response(move |tx| async move {
        match response_fn().await {
            Ok(response) => {
                if !response.is_empty() {
                    let _ = tx.send(Ok(StepChunk::Text(response))).await;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    if config.llm_type.requires_api_key() && config.api_key.as_deref().unwrap_or("").is_empty() {
        return Err(
            LlmError::Configuration(
                format!("API key missing for selected AI provider \"{}\"", config.llm_type)
            )
        );
    }
    if let Some(base_url) = &config.base_url {
        url::Url
            ::parse(base_url)
            .map_err(|e| LlmError::Configuration(format!("Invalid base URL '{}': {}", base_url, e)))?;
    }

    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        LlmType::OpenAI | LlmType::Groq | LlmType::XAI | LlmType::DeepSeek => {
            Arc::new(OpenAIChatClient::from_config(config)?)
        }
        LlmType::Anthropic | LlmType::Gemini => Arc::new(RllmChatClient::from_config(config)?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn full_response_becomes_single_text_chunk() {
        let mut stream = full_response_as_stream(|| async { Ok("hello".to_string()) });
        assert_eq!(stream.next().await.unwrap().unwrap(), StepChunk::Text("hello".into()));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn hosted_provider_without_key_is_rejected() {
        let config = LlmConfig::new(LlmType::OpenAI, crate::llm::ModelRole::Agent);
        assert!(matches!(new_client(&config), Err(LlmError::Configuration(_))));
    }
}
