pub mod chat;
pub mod error;
pub mod gateway;
pub mod tool_loop;

pub use error::LlmError;
pub use chat::ToolChoice;
pub use gateway::{ ModelGateway, StepPolicy, ToolCallLog, ToolCallRecord };

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Ollama,
    OpenAI,
    Anthropic,
    Gemini,
    DeepSeek,
    XAI,
    Groq,
}

/// Which job a model is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Classification and summarisation; no tools needed.
    Router,
    /// Specialist replies with tool calling.
    Agent,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmType::Ollama),
            "openai" => Ok(LlmType::OpenAI),
            "anthropic" => Ok(LlmType::Anthropic),
            "gemini" | "google" => Ok(LlmType::Gemini),
            "deepseek" => Ok(LlmType::DeepSeek),
            "xai" => Ok(LlmType::XAI),
            "groq" => Ok(LlmType::Groq),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Ollama => "ollama",
            LlmType::OpenAI => "openai",
            LlmType::Anthropic => "anthropic",
            LlmType::Gemini => "gemini",
            LlmType::DeepSeek => "deepseek",
            LlmType::XAI => "xai",
            LlmType::Groq => "groq",
        };
        f.write_str(name)
    }
}

impl LlmType {
    pub fn default_model(&self, role: ModelRole) -> &'static str {
        match (self, role) {
            (LlmType::Ollama, ModelRole::Router) => "gemma3:4b",
            (LlmType::Ollama, ModelRole::Agent) => "qwen3:4b",
            (LlmType::OpenAI, ModelRole::Router) => "gpt-4o-mini",
            (LlmType::OpenAI, ModelRole::Agent) => "gpt-4o",
            (LlmType::Anthropic, _) => "claude-3-5-sonnet-latest",
            (LlmType::Gemini, ModelRole::Router) => "gemini-2.5-flash-lite",
            (LlmType::Gemini, ModelRole::Agent) => "gemini-2.5-flash",
            (LlmType::DeepSeek, _) => "deepseek-chat",
            (LlmType::XAI, ModelRole::Router) => "grok-3-mini",
            (LlmType::XAI, ModelRole::Agent) => "grok-3",
            (LlmType::Groq, ModelRole::Router) => "llama-3.1-8b-instant",
            (LlmType::Groq, ModelRole::Agent) => "llama-3.3-70b-versatile",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(llm_type: LlmType, role: ModelRole) -> Self {
        Self {
            llm_type,
            api_key: None,
            model: llm_type.default_model(role).to_string(),
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::new(LlmType::Ollama, ModelRole::Agent)
    }
}

pub fn parse_llm_type(type_str: &str) -> Result<LlmType, String> {
    type_str.parse::<LlmType>().map_err(|_| format!("Unsupported LLM type: {}", type_str))
}
