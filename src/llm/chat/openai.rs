use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::sse::{ parse_sse_line, LineBuffer, SseEvent };
use super::{
    create_streaming_response,
    ChatClient,
    CompletionRequest,
    CompletionResponse,
    PromptMessage,
    PromptRole,
    StepChunk,
    StepStream,
    ToolCall,
};
use crate::llm::{ LlmConfig, LlmError, LlmType };

/// Client for any provider that speaks the OpenAI chat-completions protocol
/// (OpenAI, Groq, xAI, DeepSeek).
pub struct OpenAIChatClient {
    http: HttpClient,
    llm_type: LlmType,
    model: String,
    base_url: String,
}

#[derive(Serialize, Debug)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Debug)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize, Debug)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize, Debug)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize, Debug)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool call whose pieces are still arriving.
#[derive(Default, Debug)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn finish(self) -> ToolCall {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json
                ::from_str(&self.arguments)
                .unwrap_or_else(|_| Value::String(self.arguments.clone()))
        };
        let id = if self.id.is_empty() { uuid::Uuid::new_v4().to_string() } else { self.id };
        ToolCall { id, name: self.name, arguments }
    }
}

#[derive(Default)]
struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAssembler {
    fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(PartialToolCall::finish)
            .collect()
    }
}

fn default_base_url(llm_type: LlmType) -> &'static str {
    match llm_type {
        LlmType::Groq => "https://api.groq.com/openai/v1",
        LlmType::XAI => "https://api.x.ai/v1",
        LlmType::DeepSeek => "https://api.deepseek.com/v1",
        _ => "https://api.openai.com/v1",
    }
}

fn to_wire(message: &PromptMessage) -> WireMessage {
    WireMessage {
        role: message.role.as_str(),
        content: message.content.clone(),
        tool_calls: message.tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: "function",
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            })
            .collect(),
        tool_call_id: if message.role == PromptRole::Tool {
            message.tool_call_id.clone()
        } else {
            None
        },
    }
}

impl OpenAIChatClient {
    pub fn new(
        llm_type: LlmType,
        api_key: String,
        model: String,
        base_url: Option<String>,
        connect_timeout: Duration
    ) -> Result<Self, LlmError> {
        let api_url = base_url.unwrap_or_else(|| default_base_url(llm_type).to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                LlmError::Configuration(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            llm_type,
            model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("{} API key is required", config.llm_type)))?;

        Self::new(
            config.llm_type,
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.timeout
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ChatCompletionRequest {
        let tools: Vec<WireTool> = request.tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();
        let tool_choice = if tools.is_empty() { None } else { Some(request.tool_choice.as_str()) };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(to_wire).collect(),
            tools,
            tool_choice,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, LlmError> {
        let resp = self.http.post(self.endpoint()).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("{} returned HTTP {}: {}", self.llm_type, status, body);
            return Err(LlmError::Http { status: status.as_u16(), body });
        }
        Ok(resp)
    }
}

/// Turns an SSE chat-completions body into step chunks. Tool calls are
/// emitted once the body ends; an `error` event ends the step with that error.
fn decode_sse<S, B>(bytes: S) -> StepStream
    where S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static, B: AsRef<[u8]> + Send + 'static
{
    create_streaming_response(move |tx| async move {
        let mut bytes = Box::pin(bytes);
        let mut lines = LineBuffer::new();
        let mut assembler = ToolCallAssembler::default();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(LlmError::from(e))).await;
                    return;
                }
            };

            for line in lines.feed(chunk.as_ref()) {
                let data = match parse_sse_line(&line) {
                    Some(SseEvent::Data(data)) => data,
                    Some(SseEvent::Done) => break 'read,
                    None => continue,
                };
                let parsed = match serde_json::from_str::<StreamResponse>(&data) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Skipping undecodable stream line: {} ({})", data, e);
                        continue;
                    }
                };
                if let Some(error) = parsed.error {
                    warn!("Provider reported an error mid-stream: {}", error);
                    let _ = tx.send(Err(LlmError::from_stream_payload(&error))).await;
                    return;
                }
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() && tx.send(Ok(StepChunk::Text(content))).await.is_err() {
                            return;
                        }
                    }
                    for delta in choice.delta.tool_calls {
                        assembler.push(delta);
                    }
                    if choice.finish_reason.is_some() {
                        debug!("Stream finish_reason={:?}", choice.finish_reason);
                    }
                }
            }
        }

        for call in assembler.drain() {
            if tx.send(Ok(StepChunk::ToolCall(call))).await.is_err() {
                return;
            }
        }
    })
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request, false);
        let resp = self.send(&body).await?.json::<ChatCompletionResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Decode(format!("No choices in {} response", self.llm_type)))?
            .message.content.unwrap_or_default();

        Ok(CompletionResponse { response: content })
    }

    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        let body = self.build_request(request, true);
        info!(
            "Starting {} stream: model={} messages={} tools={}",
            self.llm_type,
            self.model,
            body.messages.len(),
            body.tools.len()
        );
        let resp = self.send(&body).await?;
        Ok(decode_sse(resp.bytes_stream()))
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn provider(&self) -> LlmType {
        self.llm_type
    }
}
