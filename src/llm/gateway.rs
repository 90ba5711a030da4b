use log::debug;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::chat::{
    create_streaming_response,
    new_client,
    ChatClient,
    CompletionRequest,
    PromptMessage,
    TextStream,
    ToolChoice,
};
use super::tool_loop::ToolLoop;
use super::{ LlmConfig, LlmError, LlmType };
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_STEPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    pub max_steps: usize,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            tool_choice: ToolChoice::Auto,
            max_tokens: None,
        }
    }
}

impl StepPolicy {
    pub fn with_max_steps(max_steps: usize) -> Self {
        Self { max_steps: max_steps.max(1), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Tool calls executed while producing one reply, in execution order.
pub type ToolCallLog = Arc<Mutex<Vec<ToolCallRecord>>>;

/// A reply being generated, and the log its tool calls are written to.
pub struct AgentStream {
    pub text_stream: TextStream,
    pub tool_calls: ToolCallLog,
}

/// One configured model plus the timeout applied to every call made through it.
#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn ChatClient>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn ChatClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::new(new_client(config)?, config.timeout))
    }

    pub fn model(&self) -> String {
        self.client.model()
    }

    pub fn provider(&self) -> LlmType {
        self.client.provider()
    }

    /// One-shot generation.
    pub async fn generate(&self, messages: Vec<PromptMessage>, max_tokens: Option<u32>) -> Result<String, LlmError> {
        let request = CompletionRequest {
            max_tokens,
            ..CompletionRequest::new(messages)
        };
        debug!("generate: model={} messages={}", self.client.model(), request.messages.len());

        let response = tokio::time
            ::timeout(self.timeout, self.client.complete(&request)).await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;
        Ok(response.response)
    }

    /// Streams a reply, running the bounded tool loop when tools are given.
    ///
    /// Nothing is requested from the model until the returned stream is first
    /// polled by the runtime; fragments are forwarded as soon as they arrive.
    pub fn stream(
        &self,
        messages: Vec<PromptMessage>,
        tools: Option<Arc<ToolRegistry>>,
        policy: StepPolicy
    ) -> AgentStream {
        let log: ToolCallLog = Arc::new(Mutex::new(Vec::new()));
        let tool_loop = ToolLoop {
            client: Arc::clone(&self.client),
            timeout: self.timeout,
            tools,
            policy,
            log: Arc::clone(&log),
        };

        AgentStream {
            text_stream: create_streaming_response(move |tx| tool_loop.run(messages, tx)),
            tool_calls: log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::{ StepChunk, ToolCall };
    use crate::test_utils::{ ScriptedChatClient, StepScript };
    use crate::tools::{ conversation::HISTORY_TOOL_NAME, ToolRegistry };
    use futures::StreamExt;
    use serde_json::json;

    async fn collect(stream: TextStream) -> (String, Option<LlmError>) {
        let mut text = String::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => text.push_str(&chunk),
                Err(e) => {
                    return (text, Some(e));
                }
            }
        }
        (text, None)
    }

    fn tool_call(name: &str) -> StepChunk {
        StepChunk::ToolCall(ToolCall { id: format!("call-{}", name), name: name.into(), arguments: json!({}) })
    }

    #[tokio::test]
    async fn generate_returns_completion_text() {
        let client = ScriptedChatClient::new();
        client.push_completion(Ok("{\"agent\":\"ORDER\"}".into()));
        let gateway = ModelGateway::new(Arc::new(client), Duration::from_secs(5));

        let text = gateway.generate(vec![PromptMessage::user("hi")], Some(200)).await.unwrap();
        assert_eq!(text, "{\"agent\":\"ORDER\"}");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_and_loop_continues() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push_step(StepScript::chunks(vec![tool_call("deleteEverything")]));
        client.push_step(StepScript::text(&["Sorry, ", "I cannot do that."]));
        let gateway = ModelGateway::new(client.clone(), Duration::from_secs(5));

        let agent = gateway.stream(vec![PromptMessage::user("hi")], Some(Arc::new(ToolRegistry::new())), StepPolicy::default());
        let (text, err) = collect(agent.text_stream).await;
        assert!(err.is_none());
        assert_eq!(text, "Sorry, I cannot do that.");

        let log = agent.tool_calls.lock().await;
        assert_eq!(log.len(), 1);
        assert!(log[0].result["error"].as_str().unwrap().contains("deleteEverything"));

        let requests = client.step_requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.tool_name.as_deref(), Some("deleteEverything"));
    }

    #[tokio::test]
    async fn step_cap_ends_quietly_with_partial_text() {
        let client = Arc::new(ScriptedChatClient::new());
        for _ in 0..10 {
            client.push_step(StepScript::chunks(vec![StepChunk::Text("x".into()), tool_call(HISTORY_TOOL_NAME)]));
        }
        let gateway = ModelGateway::new(client.clone(), Duration::from_secs(5));

        let agent = gateway.stream(
            vec![PromptMessage::user("loop")],
            Some(Arc::new(ToolRegistry::new())),
            StepPolicy::with_max_steps(3)
        );
        let (text, err) = collect(agent.text_stream).await;
        assert!(err.is_none());
        assert_eq!(text, "xxx");
        assert_eq!(client.step_requests().len(), 3);
    }

    #[tokio::test]
    async fn mid_stream_failure_surfaces_after_partial_text() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push_step(StepScript::text(&["partial"]).then_fail(LlmError::Provider("boom".into())));
        let gateway = ModelGateway::new(client, Duration::from_secs(5));

        let agent = gateway.stream(vec![PromptMessage::user("hi")], None, StepPolicy::default());
        let (text, err) = collect(agent.text_stream).await;
        assert_eq!(text, "partial");
        assert!(matches!(err, Some(LlmError::Provider(_))));
    }

    #[tokio::test]
    async fn stalled_step_times_out() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push_step(StepScript::text(&["slow"]).with_delay(Duration::from_millis(300)));
        let gateway = ModelGateway::new(client, Duration::from_millis(50));

        let agent = gateway.stream(vec![PromptMessage::user("hi")], None, StepPolicy::default());
        let (_, err) = collect(agent.text_stream).await;
        assert!(matches!(err, Some(LlmError::Timeout(_))));
    }
}
