use axum::http::{ header, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde::Serialize;
use serde_json::json;

use crate::llm::LlmError;
use crate::orchestrator::ChatError;

/// Failure categories reported to chat clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    ApiKeyInvalid,
    ModelUnavailable,
    ContextOverflow,
    Internal,
    Validation,
    Unauthorized,
    NotFound,
}

const RATE_LIMIT_HINTS: [&str; 5] = ["rate limit", "rate_limit", "quota", "too many requests", "resource exhausted"];
const AUTH_HINTS: [&str; 5] = ["api key", "authentication", "unauthorized", "invalid key", "permission denied"];
const UNAVAILABLE_HINTS: [&str; 6] = [
    "model not found",
    "model_not_found",
    "not available",
    "does not exist",
    "connection refused",
    "fetch failed",
];
const OVERFLOW_HINTS: [&str; 3] = ["token", "context length", "too long"];

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ApiKeyInvalid => "api_key_invalid",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::ContextOverflow => "context_overflow",
            ErrorKind::Internal => "internal",
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ApiKeyInvalid => StatusCode::BAD_GATEWAY,
            ErrorKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ContextOverflow => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "The AI service is currently rate-limited. Please wait a moment and try again.",
            ErrorKind::ApiKeyInvalid => "AI service authentication failed. Please check the API key configuration.",
            ErrorKind::ModelUnavailable =>
                "The AI model is currently unavailable. Please try again later or switch providers.",
            ErrorKind::ContextOverflow =>
                "The conversation is too long for the AI model. Try starting a new conversation.",
            ErrorKind::Internal => "An unexpected error occurred while processing your message. Please try again.",
            ErrorKind::Validation => "The request is invalid.",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::NotFound => "Not found",
        }
    }

    /// Status code first, then the wording of the failure.
    pub fn classify(err: &LlmError) -> ErrorKind {
        match err.status() {
            Some(429) => {
                return ErrorKind::RateLimit;
            }
            Some(401) | Some(403) => {
                return ErrorKind::ApiKeyInvalid;
            }
            _ => {}
        }

        match err {
            LlmError::Decode(_) => ErrorKind::Internal,
            LlmError::Timeout(_) => ErrorKind::ModelUnavailable,
            LlmError::Transport(e) if e.is_connect() => ErrorKind::ModelUnavailable,
            _ => Self::classify_text(&err.to_string()),
        }
    }

    fn classify_text(text: &str) -> ErrorKind {
        let lower = text.to_lowercase();
        let hit = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

        if lower.contains("429") || hit(&RATE_LIMIT_HINTS) {
            ErrorKind::RateLimit
        } else if lower.contains("401") || lower.contains("403") || hit(&AUTH_HINTS) {
            ErrorKind::ApiKeyInvalid
        } else if hit(&UNAVAILABLE_HINTS) {
            ErrorKind::ModelUnavailable
        } else if hit(&OVERFLOW_HINTS) {
            ErrorKind::ContextOverflow
        } else {
            ErrorKind::Internal
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub field: Option<&'static str>,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), field: None, retry_after: None }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self { field: Some(field), ..Self::new(ErrorKind::Validation, message) }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, "Unauthorized")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, ErrorKind::Internal.user_message())
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self { retry_after: Some(retry_after), ..Self::new(ErrorKind::RateLimit, message) }
    }
}

impl From<&LlmError> for ApiError {
    fn from(err: &LlmError) -> Self {
        let kind = ErrorKind::classify(err);
        Self::new(kind, kind.user_message())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ChatError::Store(e) => {
                error!("Conversation store failure: {}", e);
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message, "errorType": self.kind.as_str() });
        if let Some(field) = self.field {
            body["field"] = json!(field);
        }
        if let Some(retry_after) = self.retry_after {
            body["retryAfter"] = json!(retry_after);
        }

        let mut response = (self.kind.status(), Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
