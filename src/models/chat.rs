use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The specialist that produced an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Order,
    Billing,
    Support,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Support, AgentKind::Order, AgentKind::Billing];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Order => "order",
            AgentKind::Billing => "billing",
            AgentKind::Support => "support",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "order" => Ok(AgentKind::Order),
            "billing" => Ok(AgentKind::Billing),
            "support" => Ok(AgentKind::Support),
            other => Err(format!("Unknown agent type: '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be written; the store assigns id and timestamp.
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub agent_type: Option<AgentKind>,
    pub tool_calls: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn user(conversation_id: &str, content: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role: MessageRole::User,
            content: content.to_string(),
            agent_type: None,
            tool_calls: None,
        }
    }

    pub fn assistant(
        conversation_id: &str,
        content: String,
        agent_type: AgentKind,
        tool_calls: Option<serde_json::Value>
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role: MessageRole::Assistant,
            content,
            agent_type: Some(agent_type),
            tool_calls,
        }
    }
}

/// Role/content pair forwarded to the model. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

impl From<&ChatMessage> for HistoryMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self { role: msg.role, content: msg.content.clone() }
    }
}

/// Title for a new conversation: the first 80 characters of the opening message.
pub fn derive_title(message: &str) -> String {
    message.chars().take(80).collect()
}
