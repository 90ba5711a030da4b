use futures::stream::{ self, StreamExt };
use log::{ error, info, warn };
use std::sync::Arc;

use crate::history::ConversationStore;
use crate::llm::chat::TextStream;
use crate::llm::ToolCallLog;
use crate::models::chat::{ AgentKind, NewMessage };

/// Where a finished reply is written.
pub struct ReplySink {
    pub store: Arc<dyn ConversationStore>,
    pub conversation_id: String,
    pub agent: AgentKind,
    pub tool_calls: ToolCallLog,
}

impl ReplySink {
    async fn commit(self, content: String, chunks: usize) {
        if content.trim().is_empty() {
            info!("Agent {} produced no content in {} chunk(s); nothing persisted", self.agent, chunks);
            return;
        }

        let calls = self.tool_calls.lock().await.clone();
        let tool_calls = if calls.is_empty() {
            None
        } else {
            match serde_json::to_value(&calls) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Could not encode tool-call log: {}", e);
                    None
                }
            }
        };

        let chars = content.chars().count();
        let message = NewMessage::assistant(&self.conversation_id, content, self.agent, tool_calls);
        if let Err(e) = self.store.add_message(message).await {
            error!("Failed to persist assistant reply for {}: {}", self.conversation_id, e);
            return;
        }
        if let Err(e) = self.store.touch_conversation(&self.conversation_id).await {
            error!("Failed to touch conversation {}: {}", self.conversation_id, e);
        }
        info!(
            "Persisted {} reply for {}: {} chunk(s), {} chars, {} tool call(s)",
            self.agent,
            self.conversation_id,
            chunks,
            chars,
            calls.len()
        );
    }
}

enum ProxyState {
    Relaying {
        upstream: TextStream,
        buffer: String,
        chunks: usize,
        sink: ReplySink,
    },
    Closed,
}

/// Forwards every fragment as soon as it is pulled while keeping a copy.
///
/// The reply is written once, after the upstream ends normally. An upstream
/// error is passed through and closes the stream without writing anything.
/// Dropping the stream early writes nothing either.
pub fn persisting_stream(upstream: TextStream, sink: ReplySink) -> TextStream {
    let initial = ProxyState::Relaying { upstream, buffer: String::new(), chunks: 0, sink };

    let proxy = stream::unfold(initial, |state| async move {
        match state {
            ProxyState::Relaying { mut upstream, mut buffer, chunks, sink } =>
                match upstream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_str(&chunk);
                        let next = ProxyState::Relaying { upstream, buffer, chunks: chunks + 1, sink };
                        Some((Ok(chunk), next))
                    }
                    Some(Err(e)) => {
                        warn!(
                            "Agent stream for {} failed after {} chunk(s): {}",
                            sink.conversation_id,
                            chunks,
                            e
                        );
                        Some((Err(e), ProxyState::Closed))
                    }
                    None => {
                        sink.commit(buffer, chunks).await;
                        None
                    }
                }
            ProxyState::Closed => None,
        }
    });

    Box::pin(proxy.fuse())
}
