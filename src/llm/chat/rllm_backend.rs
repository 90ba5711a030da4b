use async_trait::async_trait;
use log::info;
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::chat::{ ChatMessage, ChatProvider, ChatRole, MessageType };
use rllm::LLMProvider;
use std::sync::Arc;

use super::{
    full_response_as_stream,
    ChatClient,
    CompletionRequest,
    CompletionResponse,
    PromptRole,
    StepStream,
};
use crate::llm::{ LlmConfig, LlmError, LlmType };

/// Anthropic and Gemini through `rllm`. Replies arrive in one piece and tool
/// definitions are not forwarded.
pub struct RllmChatClient {
    llm: Arc<dyn LLMProvider>,
    llm_type: LlmType,
    model: String,
    base_url: Option<String>,
}

impl RllmChatClient {
    pub fn new(
        llm_type: LlmType,
        api_key: String,
        model: String,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        let backend = match llm_type {
            LlmType::Anthropic => LLMBackend::Anthropic,
            LlmType::Gemini => LLMBackend::Google,
            other => {
                return Err(LlmError::Configuration(format!("{} is not served through rllm", other)));
            }
        };

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .api_key(api_key)
            .model(&model)
            .stream(false);

        if let Some(url) = &base_url {
            builder = builder.base_url(url);
        }

        let llm_provider = builder.build().map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self {
            llm: Arc::from(llm_provider),
            llm_type,
            model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("{} API key is required", config.llm_type)))?;

        Self::new(config.llm_type, api_key, config.model.clone(), config.base_url.clone())
    }
}

/// Flattens a prompt into the user/assistant turns `rllm` accepts. System text
/// and tool results are folded into user turns.
fn to_rllm_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len());
    let mut system = Vec::new();

    for m in &request.messages {
        match m.role {
            PromptRole::System => system.push(m.content.clone()),
            PromptRole::Assistant => {
                if !m.content.is_empty() {
                    messages.push(ChatMessage {
                        role: ChatRole::Assistant,
                        content: m.content.clone(),
                        message_type: MessageType::Text,
                    });
                }
            }
            PromptRole::User | PromptRole::Tool => {
                messages.push(ChatMessage {
                    role: ChatRole::User,
                    content: m.content.clone(),
                    message_type: MessageType::Text,
                });
            }
        }
    }

    if !system.is_empty() {
        messages.insert(0, ChatMessage {
            role: ChatRole::User,
            content: system.join("\n\n"),
            message_type: MessageType::Text,
        });
    }
    messages
}

async fn chat_once(
    llm: &dyn LLMProvider,
    messages: Vec<ChatMessage>
) -> Result<String, LlmError> {
    let resp = llm.chat(&messages).await.map_err(|e| LlmError::Provider(e.to_string()))?;
    Ok(
        resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string())
    )
}

#[async_trait]
impl ChatClient for RllmChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        info!(
            "RllmChatClient::complete() → provider={} model={} base_url={:?}",
            self.llm_type,
            self.model,
            self.base_url
        );
        let text = chat_once(self.llm.as_ref(), to_rllm_messages(request)).await?;
        Ok(CompletionResponse { response: text })
    }

    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        let llm = Arc::clone(&self.llm);
        let messages = to_rllm_messages(request);
        Ok(full_response_as_stream(move || async move { chat_once(llm.as_ref(), messages).await }))
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn provider(&self) -> LlmType {
        self.llm_type
    }

    fn supports_tools(&self) -> bool {
        false
    }
}
