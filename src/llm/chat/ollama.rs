use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, info, warn };
use std::time::Duration;

use super::sse::LineBuffer;
use super::{
    create_streaming_response,
    ChatClient,
    CompletionRequest,
    CompletionResponse,
    PromptMessage,
    StepChunk,
    StepStream,
    ToolCall,
};
use crate::llm::{ LlmConfig, LlmError, LlmType };

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize, Deserialize, Default)]
struct OllamaMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction,
}

#[derive(Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<Value>,
}

fn to_ollama(message: &PromptMessage) -> OllamaMessage {
    OllamaMessage {
        role: message.role.as_str().to_string(),
        content: message.content.clone(),
        tool_calls: message.tool_calls
            .iter()
            .map(|c| OllamaToolCall {
                function: OllamaFunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                },
            })
            .collect(),
    }
}

/// Ollama sends arguments as an object, but some models emit a JSON string instead.
fn from_ollama(call: OllamaToolCall) -> ToolCall {
    let arguments = match call.function.arguments {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    ToolCall {
        id: uuid::Uuid::new_v4().to_string(),
        name: call.function.name,
        arguments,
    }
}

/// Turns an NDJSON chat body into step chunks. An `error` line ends the step
/// with that error.
fn decode_ndjson<S, B>(bytes: S) -> StepStream
    where S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static, B: AsRef<[u8]> + Send + 'static
{
    create_streaming_response(move |tx| async move {
        let mut bytes = Box::pin(bytes);
        let mut lines = LineBuffer::new();
        let mut finished = false;

        while !finished {
            let pending = match bytes.next().await {
                Some(Ok(chunk)) => lines.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    let _ = tx.send(Err(LlmError::from(e))).await;
                    return;
                }
                None => {
                    finished = true;
                    lines.finish().into_iter().collect()
                }
            };

            for line in pending {
                let parsed = match serde_json::from_str::<ChatResponse>(&line) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Skipping undecodable Ollama line: {} ({})", line, e);
                        continue;
                    }
                };
                if let Some(error) = parsed.error {
                    warn!("Ollama reported an error mid-stream: {}", error);
                    let _ = tx.send(Err(LlmError::from_stream_payload(&error))).await;
                    return;
                }
                if !parsed.message.content.is_empty() {
                    let text = StepChunk::Text(parsed.message.content);
                    if tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
                for call in parsed.message.tool_calls {
                    if tx.send(Ok(StepChunk::ToolCall(from_ollama(call)))).await.is_err() {
                        return;
                    }
                }
                if parsed.done {
                    return;
                }
            }
        }
    })
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, model: String, connect_timeout: Duration) -> Result<Self, LlmError> {
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());
        let http = HttpClient::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::Configuration("Invalid config type for OllamaClient".into()));
        }

        Self::new(config.base_url.clone(), config.model.clone(), config.timeout)
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        let options = if request.max_tokens.is_some() || request.temperature.is_some() {
            Some(OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            })
        } else {
            None
        };

        ChatRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(to_ollama).collect(),
            tools: request.tools
                .iter()
                .map(|t| OllamaTool {
                    kind: "function",
                    function: OllamaFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            stream,
            options,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Ollama returned HTTP {}: {}", status, body);
            return Err(LlmError::Http { status: status.as_u16(), body });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request, false);
        let data = self.send(&body).await?.json::<ChatResponse>().await?;
        if let Some(error) = data.error {
            return Err(LlmError::from_stream_payload(&error));
        }
        Ok(CompletionResponse { response: data.message.content })
    }

    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        let body = self.build_request(request, true);
        info!("Starting Ollama stream: model={} messages={}", self.model, body.messages.len());
        let resp = self.send(&body).await?;
        Ok(decode_ndjson(resp.bytes_stream()))
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn provider(&self) -> LlmType {
        LlmType::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_arguments_are_decoded() {
        let call = OllamaToolCall {
            function: OllamaFunctionCall {
                name: "getOrderById".into(),
                arguments: Value::String("{\"orderId\":\"ORD-7\"}".into()),
            },
        };
        let call = from_ollama(call);
        assert_eq!(call.arguments, json!({"orderId": "ORD-7"}));
        assert!(!call.id.is_empty());
    }

    #[test]
    fn options_only_sent_when_set() {
        let client = OllamaClient::new(None, "qwen3:4b".into(), Duration::from_secs(1)).unwrap();
        let plain = client.build_request(&CompletionRequest::new(vec![PromptMessage::user("hi")]), true);
        assert!(serde_json::to_value(&plain).unwrap().get("options").is_none());

        let mut limited = CompletionRequest::new(vec![PromptMessage::user("hi")]);
        limited.max_tokens = Some(200);
        let body = serde_json::to_value(client.build_request(&limited, false)).unwrap();
        assert_eq!(body["options"]["num_predict"], 200);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parses_final_ndjson_line() {
        let line = r#"{"model":"qwen3:4b","message":{"role":"assistant","content":""},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(line).unwrap();
        assert!(parsed.done);
        assert!(parsed.message.content.is_empty());
    }

    async fn collect(body: &[&str]) -> Vec<Result<StepChunk, LlmError>> {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = body
            .iter()
            .map(|c| Ok(c.as_bytes().to_vec()))
            .collect();
        decode_ndjson(futures::stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn error_line_after_text_fails_the_step() {
        let items = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Your order \"},\"done\":false}\n",
            "{\"error\":\"model runner has unexpectedly stopped\"}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"never seen\"},\"done\":true}\n",
        ]).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(StepChunk::Text(t)) if t == "Your order "));
        assert!(matches!(&items[1], Err(LlmError::Provider(m)) if m.contains("unexpectedly stopped")));
    }

    #[tokio::test]
    async fn text_lines_stream_until_done() {
        let items = collect(&[
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"content\":\"lo\"},",
            "\"done\":true}",
        ]).await;
        let text: Vec<String> = items
            .into_iter()
            .map(|i| match i.unwrap() {
                StepChunk::Text(t) => t,
                StepChunk::ToolCall(c) => c.name,
            })
            .collect();
        assert_eq!(text, vec!["Hel", "lo"]);
    }
}
