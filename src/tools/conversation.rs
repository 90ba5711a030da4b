use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{ json, Value };
use std::sync::Arc;

use super::{ definition, parse_args, Tool, ToolError, ToolRegistry };
use crate::history::ConversationStore;
use crate::llm::chat::ToolDefinition;

pub const HISTORY_TOOL_NAME: &str = "getRecentHistory";

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 20;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Deserialize)]
struct HistoryArgs {
    #[serde(default = "default_limit")]
    limit: usize,
}

/// Recent messages of the conversation the agent is answering in.
pub struct GetRecentHistory {
    store: Arc<dyn ConversationStore>,
    conversation_id: String,
}

pub fn register_conversation_tools(
    registry: &mut ToolRegistry,
    store: Arc<dyn ConversationStore>,
    conversation_id: &str
) {
    registry.register(GetRecentHistory {
        store,
        conversation_id: conversation_id.to_string(),
    });
}

#[async_trait]
impl Tool for GetRecentHistory {
    fn definition(&self) -> ToolDefinition {
        definition(
            HISTORY_TOOL_NAME,
            "Get recent conversation history with the support assistant",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIMIT, "default": DEFAULT_LIMIT }
                },
                "additionalProperties": false
            })
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: HistoryArgs = parse_args(input)?;
        if !(1..=MAX_LIMIT).contains(&args.limit) {
            return Err(ToolError::InvalidArguments(format!("limit must be between 1 and {}", MAX_LIMIT)));
        }

        let messages = self.store.recent_messages(&self.conversation_id, args.limit).await?;
        Ok(
            Value::Array(
                messages
                    .into_iter()
                    .map(|m| json!({ "role": m.role, "content": m.content, "createdAt": m.created_at }))
                    .collect()
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryConversationStore;
    use crate::llm::chat::ToolCall;
    use crate::models::chat::NewMessage;

    async fn setup(messages: usize) -> ToolRegistry {
        let store = Arc::new(InMemoryConversationStore::new());
        let conv = store.create_conversation("u1", "t").await.unwrap();
        for i in 0..messages {
            store.add_message(NewMessage::user(&conv.id, &format!("m{}", i))).await.unwrap();
        }
        let mut registry = ToolRegistry::new();
        register_conversation_tools(&mut registry, store, &conv.id);
        registry
    }

    fn call(arguments: Value) -> ToolCall {
        ToolCall { id: "h".into(), name: HISTORY_TOOL_NAME.into(), arguments }
    }

    #[tokio::test]
    async fn defaults_to_ten_oldest_first() {
        let registry = setup(15).await;
        let result = registry.invoke(&call(json!({}))).await.unwrap();
        let list = result.as_array().unwrap();
        assert_eq!(list.len(), 10);
        assert_eq!(list[0]["content"], "m5");
        assert_eq!(list[9]["content"], "m14");
    }

    #[tokio::test]
    async fn rejects_out_of_range_limit() {
        let registry = setup(1).await;
        assert!(matches!(registry.invoke(&call(json!({"limit": 21}))).await, Err(ToolError::InvalidArguments(_))));
        assert!(matches!(registry.invoke(&call(json!({"limit": 0}))).await, Err(ToolError::InvalidArguments(_))));
    }
}
