use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::{ AsyncCommands, Client };

use super::{ ConversationStore, StoreError };
use crate::models::chat::{ ChatMessage, Conversation, ConversationStatus, NewMessage };

/// Redis layout, all keys under `key_prefix`:
/// `conv:{id}` JSON conversation record, `messages:{id}` list of JSON
/// messages in insertion order, `user:{user_id}:conversations` sorted set
/// scored by `updated_at` millis.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn conversation_key(&self, id: &str) -> String {
        format!("{}conv:{}", self.key_prefix, id)
    }

    fn messages_key(&self, id: &str) -> String {
        format!("{}messages:{}", self.key_prefix, id)
    }

    fn user_index_key(&self, user_id: &str) -> String {
        format!("{}user:{}:conversations", self.key_prefix, user_id)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str
    ) -> Result<Option<Conversation>, StoreError> {
        let raw: Option<String> = conn.get(self.conversation_key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        conversation: &Conversation
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(conversation)?;
        let _: () = conn.set(self.conversation_key(&conversation.id), json).await?;
        let _: i64 = conn.zadd(
            self.user_index_key(&conversation.user_id),
            &conversation.id,
            conversation.updated_at.timestamp_millis()
        ).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.save(&mut conn, &conversation).await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        Ok(self.load(&mut conn, id).await?.filter(|c| c.user_id == user_id))
    }

    async fn list_conversations(&self, user_id: &str, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.user_index_key(user_id), 0, (limit as isize) - 1).await?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&mut conn, &id).await {
                Ok(Some(c)) => conversations.push(c),
                Ok(None) => {}
                Err(e) => error!("Error loading conversation {}: {}", id, e),
            }
        }
        Ok(conversations)
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let entries: Vec<String> = conn.lrange(self.messages_key(conversation_id), -(limit as isize), -1).await?;

        let mut messages = Vec::with_capacity(entries.len());
        for entry in &entries {
            match serde_json::from_str::<ChatMessage>(entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Error parsing history entry: {}", e),
            }
        }
        Ok(messages)
    }

    async fn add_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(self.conversation_key(&message.conversation_id)).await?;
        if !exists {
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
        let json = serde_json::to_string(&stored)?;
        let _: i64 = conn.rpush(self.messages_key(&stored.conversation_id), json).await?;
        Ok(stored)
    }

    async fn touch_conversation(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let mut conversation = self
            .load(&mut conn, id).await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", id)))?;
        conversation.updated_at = Utc::now();
        self.save(&mut conn, &conversation).await
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        let owned = self
            .load(&mut conn, id).await?
            .map_or(false, |c| c.user_id == user_id);
        if !owned {
            return Ok(false);
        }

        let _: i64 = conn.del(self.messages_key(id)).await?;
        let _: i64 = conn.del(self.conversation_key(id)).await?;
        let _: i64 = conn.zrem(self.user_index_key(user_id), id).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_the_prefix() {
        let store = RedisConversationStore::new("redis://127.0.0.1:6379", "helpdesk:").unwrap();
        assert_eq!(store.conversation_key("c1"), "helpdesk:conv:c1");
        assert_eq!(store.messages_key("c1"), "helpdesk:messages:c1");
        assert_eq!(store.user_index_key("u1"), "helpdesk:user:u1:conversations");
    }
}
