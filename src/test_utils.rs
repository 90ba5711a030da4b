//! Deterministic stand-ins for the network-facing seams, shared by unit and
//! integration tests.

use async_trait::async_trait;
use chrono::{ DateTime, Duration as ChronoDuration, Utc };
use futures::stream::{ self, StreamExt };
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::llm::chat::{ ChatClient, CompletionRequest, CompletionResponse, StepChunk, StepStream };
use crate::llm::{ LlmError, LlmType };
use crate::server::rate_limit::Clock;

/// What one scripted model step yields.
pub struct StepScript {
    items: Vec<Result<StepChunk, LlmError>>,
    delay: Option<Duration>,
}

impl StepScript {
    pub fn chunks(chunks: Vec<StepChunk>) -> Self {
        Self { items: chunks.into_iter().map(Ok).collect(), delay: None }
    }

    pub fn text(fragments: &[&str]) -> Self {
        Self::chunks(
            fragments
                .iter()
                .map(|f| StepChunk::Text(f.to_string()))
                .collect()
        )
    }

    /// Fails the step after the chunks scripted so far.
    pub fn then_fail(mut self, error: LlmError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Sleeps before every item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A `ChatClient` answering from queues instead of a provider.
///
/// An empty completion queue answers with a provider error; an empty step
/// queue answers with a step that yields nothing.
pub struct ScriptedChatClient {
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    steps: Mutex<VecDeque<StepScript>>,
    completion_requests: Mutex<Vec<CompletionRequest>>,
    step_requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            steps: Mutex::new(VecDeque::new()),
            completion_requests: Mutex::new(Vec::new()),
            step_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_completion(&self, completion: Result<String, LlmError>) {
        if let Ok(mut queue) = self.completions.lock() {
            queue.push_back(completion);
        }
    }

    pub fn push_step(&self, step: StepScript) {
        if let Ok(mut queue) = self.steps.lock() {
            queue.push_back(step);
        }
    }

    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completion_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn step_requests(&self) -> Vec<CompletionRequest> {
        self.step_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.completion_requests.lock() {
            requests.push(request.clone());
        }
        let next = self.completions.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(result) => result.map(|response| CompletionResponse { response }),
            None => Err(LlmError::Provider("no scripted completion left".into())),
        }
    }

    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        if let Ok(mut requests) = self.step_requests.lock() {
            requests.push(request.clone());
        }
        let script = self.steps
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| StepScript::chunks(Vec::new()));

        let delay = script.delay;
        let stream = stream::iter(script.items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }

    fn model(&self) -> String {
        "scripted".to_string()
    }

    fn provider(&self) -> LlmType {
        LlmType::Ollama
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|n| *n)
            .unwrap_or_else(|_| Utc::now())
    }
}
