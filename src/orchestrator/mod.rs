pub mod compactor;
pub mod persist;
pub mod router;

pub use compactor::ContextCompactor;
pub use persist::{ persisting_stream, ReplySink };
pub use router::{ IntentRouter, RouterPolicy };

use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::agents::{ AgentRequest, AgentSet };
use crate::history::{ ConversationStore, StoreError };
use crate::llm::chat::TextStream;
use crate::models::chat::{ derive_title, AgentKind, ChatMessage, Conversation, HistoryMessage, NewMessage };
use crate::models::routing::RouterResult;

pub const HISTORY_LIMIT: usize = 50;
pub const CONVERSATION_LIST_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ProcessRequest<'a> {
    pub message: &'a str,
    pub user_id: &'a str,
    pub conversation_id: &'a str,
    /// Prior turns, oldest first, without the new message.
    pub history: Vec<HistoryMessage>,
}

/// A reply that is still being generated.
pub struct ProcessedMessage {
    pub text_stream: TextStream,
    pub agent_type: AgentKind,
    pub conversation_id: String,
    pub route: RouterResult,
}

/// Ties compaction, routing, dispatch and persistence into one request.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    compactor: ContextCompactor,
    router: IntentRouter,
    agents: AgentSet,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        compactor: ContextCompactor,
        router: IntentRouter,
        agents: AgentSet
    ) -> Self {
        Self { store, compactor, router, agents }
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub async fn create_conversation(&self, user_id: &str, first_message: &str) -> Result<Conversation, ChatError> {
        Ok(self.store.create_conversation(user_id, &derive_title(first_message)).await?)
    }

    pub async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Conversation>, ChatError> {
        Ok(self.store.get_conversation(id, user_id).await?)
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list_conversations(user_id, CONVERSATION_LIST_LIMIT).await?)
    }

    /// The latest messages of a conversation the user owns, oldest first.
    pub async fn conversation_messages(&self, id: &str, user_id: &str) -> Result<(Conversation, Vec<ChatMessage>), ChatError> {
        let conversation = self.store
            .get_conversation(id, user_id).await?
            .ok_or_else(|| ChatError::NotFound(format!("Conversation {}", id)))?;
        let messages = self.store.recent_messages(id, HISTORY_LIMIT).await?;
        Ok((conversation, messages))
    }

    pub async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<(), ChatError> {
        if self.store.delete_conversation(id, user_id).await? {
            Ok(())
        } else {
            Err(ChatError::NotFound(format!("Conversation {}", id)))
        }
    }

    /// Resolves or creates the conversation, loads its history, and
    /// processes the message.
    pub async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>
    ) -> Result<ProcessedMessage, ChatError> {
        let conversation = match conversation_id.filter(|id| !id.trim().is_empty()) {
            Some(id) =>
                self.store
                    .get_conversation(id, user_id).await?
                    .ok_or_else(|| ChatError::NotFound(format!("Conversation {}", id)))?,
            None => self.create_conversation(user_id, message).await?,
        };

        let history = self.store
            .recent_messages(&conversation.id, HISTORY_LIMIT).await?
            .iter()
            .map(HistoryMessage::from)
            .collect();

        self.process_message(ProcessRequest {
            message,
            user_id,
            conversation_id: &conversation.id,
            history,
        }).await
    }

    /// Compact, persist the user message, classify, dispatch, and wrap the
    /// reply so it is stored once it has been fully streamed.
    pub async fn process_message(&self, request: ProcessRequest<'_>) -> Result<ProcessedMessage, ChatError> {
        let history = self.compactor.compact(request.history).await;

        self.store.add_message(NewMessage::user(request.conversation_id, request.message)).await?;

        let route = self.router.classify(request.message, &history).await;
        let agent_type = route.agent.agent_kind();
        info!(
            "Router result for {}: agent={:?} confidence={:.2} -> {} agent ({})",
            request.conversation_id,
            route.agent,
            route.confidence,
            agent_type,
            route.reasoning
        );

        let mut context = history;
        context.push(HistoryMessage::user(request.message));

        let agent = self.agents.get(agent_type).execute(AgentRequest {
            user_message: request.message,
            user_id: request.user_id,
            conversation_id: request.conversation_id,
            history: context,
        });

        let sink = ReplySink {
            store: self.store.clone(),
            conversation_id: request.conversation_id.to_string(),
            agent: agent_type,
            tool_calls: agent.tool_calls,
        };

        Ok(ProcessedMessage {
            text_stream: persisting_stream(agent.text_stream, sink),
            agent_type,
            conversation_id: request.conversation_id.to_string(),
            route,
        })
    }
}
