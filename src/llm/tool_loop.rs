//! Bounded tool-calling loop.
//!
//! Each step asks the model for a streamed answer. Text is forwarded to the
//! consumer as it arrives; requested tool calls are executed, their results
//! appended to the prompt, and the next step begins. The loop ends on a step
//! without tool calls or when the step budget is spent. Running out of steps
//! is not an error: whatever text was produced stands.

use futures::StreamExt;
use log::{ debug, info, warn };
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::chat::{ ChatClient, CompletionRequest, PromptMessage, StepChunk, ToolCall };
use super::gateway::{ StepPolicy, ToolCallLog, ToolCallRecord };
use super::LlmError;
use crate::tools::ToolRegistry;

pub struct ToolLoop {
    pub client: Arc<dyn ChatClient>,
    pub timeout: Duration,
    pub tools: Option<Arc<ToolRegistry>>,
    pub policy: StepPolicy,
    pub log: ToolCallLog,
}

enum StepOutcome {
    Finished,
    ToolCalls(Vec<ToolCall>, String),
    ConsumerGone,
}

impl ToolLoop {
    pub async fn run(self, messages: Vec<PromptMessage>, tx: mpsc::Sender<Result<String, LlmError>>) {
        if let Err(e) = self.drive(messages, &tx).await {
            warn!("Agent stream failed: {}", e);
            let _ = tx.send(Err(e)).await;
        }
    }

    async fn drive(
        &self,
        mut messages: Vec<PromptMessage>,
        tx: &mpsc::Sender<Result<String, LlmError>>
    ) -> Result<(), LlmError> {
        let tool_defs = match &self.tools {
            Some(registry) if self.client.supports_tools() => registry.definitions(),
            _ => Vec::new(),
        };

        for step in 1..=self.policy.max_steps {
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                tool_choice: self.policy.tool_choice,
                max_tokens: self.policy.max_tokens,
                temperature: None,
            };

            match self.step(&request, tx).await? {
                StepOutcome::Finished => {
                    debug!("Tool loop finished after {} step(s)", step);
                    return Ok(());
                }
                StepOutcome::ConsumerGone => {
                    info!("Stream consumer went away at step {}", step);
                    return Ok(());
                }
                StepOutcome::ToolCalls(calls, text) => {
                    messages.push(PromptMessage::assistant_tool_calls(text, calls.clone()));
                    for call in &calls {
                        let result = self.execute(call).await;
                        messages.push(PromptMessage::tool_result(call, result.to_string()));
                    }
                }
            }
        }

        info!("Tool loop reached its {} step limit", self.policy.max_steps);
        Ok(())
    }

    async fn step(
        &self,
        request: &CompletionRequest,
        tx: &mpsc::Sender<Result<String, LlmError>>
    ) -> Result<StepOutcome, LlmError> {
        let secs = self.timeout.as_secs();
        let mut stream = tokio::time
            ::timeout(self.timeout, self.client.stream_step(request)).await
            .map_err(|_| LlmError::Timeout(secs))??;

        let mut calls = Vec::new();
        let mut text = String::new();
        loop {
            let next = tokio::time
                ::timeout(self.timeout, stream.next()).await
                .map_err(|_| LlmError::Timeout(secs))?;
            match next {
                Some(Ok(StepChunk::Text(chunk))) => {
                    text.push_str(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        return Ok(StepOutcome::ConsumerGone);
                    }
                }
                Some(Ok(StepChunk::ToolCall(call))) => calls.push(call),
                Some(Err(e)) => {
                    return Err(e);
                }
                None => {
                    break;
                }
            }
        }

        if calls.is_empty() || self.tools.is_none() {
            Ok(StepOutcome::Finished)
        } else {
            Ok(StepOutcome::ToolCalls(calls, text))
        }
    }

    /// Runs one tool call. Failures become an `{"error": ...}` result so the
    /// model can recover on the next step.
    async fn execute(&self, call: &ToolCall) -> Value {
        let result = match &self.tools {
            Some(registry) =>
                match registry.invoke(call).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Tool {} failed: {}", call.name, e);
                        json!({ "error": e.to_string() })
                    }
                }
            None => json!({ "error": format!("unknown tool: {}", call.name) }),
        };

        info!("Tool call {} executed", call.name);
        self.log.lock().await.push(ToolCallRecord {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: result.clone(),
        });
        result
    }
}
