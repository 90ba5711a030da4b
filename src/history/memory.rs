use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ ConversationStore, StoreError };
use crate::models::chat::{ ChatMessage, Conversation, ConversationStatus, NewMessage };

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<ChatMessage>>,
}

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        inner.messages.insert(conversation.id.clone(), Vec::new());
        inner.conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(
            inner.conversations
                .get(id)
                .filter(|c| c.user_id == user_id)
                .cloned()
        )
    }

    async fn list_conversations(&self, user_id: &str, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut owned: Vec<Conversation> = inner.conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let all = match inner.messages.get(conversation_id) {
            Some(m) => m,
            None => {
                return Ok(Vec::new());
            }
        };
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn add_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(format!("conversation {}", message.conversation_id)));
        }

        let stored = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            agent_type: message.agent_type,
            tool_calls: message.tool_calls,
            created_at: Utc::now(),
        };
        inner.messages.entry(stored.conversation_id.clone()).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn touch_conversation(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", id)))?;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let owned = inner.conversations.get(id).map_or(false, |c| c.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        inner.messages.remove(id);
        inner.conversations.remove(id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::AgentKind;

    #[tokio::test]
    async fn recent_messages_returns_newest_window_oldest_first() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation("u1", "hello").await.unwrap();
        for i in 0..5 {
            store.add_message(NewMessage::user(&conv.id, &format!("m{}", i))).await.unwrap();
        }

        let recent = store.recent_messages(&conv.id, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_delete() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation("owner", "t").await.unwrap();

        assert!(store.get_conversation(&conv.id, "intruder").await.unwrap().is_none());
        assert!(!store.delete_conversation(&conv.id, "intruder").await.unwrap());
        assert!(store.get_conversation(&conv.id, "owner").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_messages_too() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation("u1", "t").await.unwrap();
        store
            .add_message(NewMessage::assistant(&conv.id, "hi".into(), AgentKind::Support, None)).await
            .unwrap();

        assert!(store.delete_conversation(&conv.id, "u1").await.unwrap());
        assert!(store.recent_messages(&conv.id, 50).await.unwrap().is_empty());
        assert!(store.get_conversation(&conv.id, "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touching_reorders_listing() {
        let store = InMemoryConversationStore::new();
        let first = store.create_conversation("u1", "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_conversation("u1", "second").await.unwrap();

        let listed = store.list_conversations("u1", 20).await.unwrap();
        assert_eq!(listed[0].id, second.id);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch_conversation(&first.id).await.unwrap();
        let listed = store.list_conversations("u1", 20).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[0].title, "first");
    }

    #[tokio::test]
    async fn message_for_missing_conversation_is_rejected() {
        let store = InMemoryConversationStore::new();
        let err = store.add_message(NewMessage::user("nope", "hi")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
