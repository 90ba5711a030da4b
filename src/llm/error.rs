use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider returned HTTP {status}: {body}")]
    Http {
        status: u16,
        body: String,
    },
    #[error("request to model provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("invalid model configuration: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            LlmError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Error object a provider sends inside an already accepted body: either
    /// a bare string or `{"message", "code" | "status"}`.
    pub fn from_stream_payload(payload: &Value) -> Self {
        let message = match payload {
            Value::String(s) => s.clone(),
            Value::Object(map) =>
                map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string()),
            other => other.to_string(),
        };
        let status = ["code", "status"]
            .iter()
            .filter_map(|key| payload.get(*key))
            .find_map(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .filter(|code| (400..600).contains(code));

        match status {
            Some(status) => LlmError::Http { status: status as u16, body: message },
            None => LlmError::Provider(message),
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Decode(err.to_string())
    }
}
