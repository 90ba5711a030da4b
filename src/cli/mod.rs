use clap::Parser;
use std::time::Duration;

use crate::config::ConfigError;
use crate::llm::{ parse_llm_type, LlmConfig, LlmType, ModelRole };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Allowed CORS origins, comma separated. Empty allows any origin.
    #[arg(long, env = "CORS_ORIGIN", default_value = "")]
    pub cors_origin: String,

    /// Secret used to verify HS256 access tokens.
    #[arg(long, env = "JWT_ACCESS_SECRET")]
    pub jwt_access_secret: Option<String>,

    // --- AI Provider Args ---
    /// Model provider (ollama, openai, groq, xai, deepseek, anthropic, gemini)
    #[arg(long, env = "AI_PROVIDER", default_value = "ollama")]
    pub ai_provider: String,

    /// Base URL for the provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "AI_BASE_URL")]
    pub ai_base_url: Option<String>,

    /// API key for the provider. Falls back to the provider specific variables below.
    #[arg(long, env = "AI_API_KEY")]
    pub ai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_GENERATIVE_AI_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "XAI_API_KEY", hide_env_values = true)]
    pub xai_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// Lightweight model used for classification and summaries.
    #[arg(long, env = "ROUTER_MODEL")] // No default, rely on provider defaults if None
    pub router_model: Option<String>,

    /// Full model used by the specialist agents.
    #[arg(long, env = "AGENT_MODEL")]
    pub agent_model: Option<String>,

    /// Timeout in seconds for each model call and each streamed step.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "60")]
    pub llm_timeout_secs: u64,

    /// Maximum tool-calling steps per agent reply.
    #[arg(long, env = "AGENT_MAX_STEPS", default_value = "5")]
    pub agent_max_steps: usize,

    // --- Context Args ---
    /// Number of latest messages kept verbatim when compacting.
    #[arg(long, env = "CONTEXT_WINDOW_SIZE", default_value = "10")]
    pub context_window_size: usize,

    /// History length above which older messages are summarised.
    #[arg(long, env = "COMPACTION_THRESHOLD", default_value = "16")]
    pub compaction_threshold: usize,

    /// Optional JSON file overriding any of the built-in prompts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "helpdesk:")]
    pub history_redis_prefix: String,

    /// Load demo orders, invoices and articles for the demo user on startup.
    #[arg(long, env = "SEED_DEMO_DATA", default_value = "false")]
    pub seed_demo_data: bool,

    #[arg(long, env = "DEMO_USER_ID", default_value = "user_123")]
    pub demo_user_id: String,

    // --- Rate Limit Args ---
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value = "60000")]
    pub rate_limit_window_ms: u64,

    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "20")]
    pub rate_limit_max_requests: u32,

    /// Process-wide burst guard across all clients.
    #[arg(long, env = "GLOBAL_RATE_PER_SECOND", default_value = "50")]
    pub global_rate_per_second: u32,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn provider(&self) -> Result<LlmType, ConfigError> {
        parse_llm_type(&self.ai_provider).map_err(ConfigError::InvalidProvider)
    }

    /// `AI_API_KEY` first, then the variable conventionally used by the provider.
    pub fn api_key(&self, provider: LlmType) -> Option<String> {
        let specific = match provider {
            LlmType::Ollama => None,
            LlmType::OpenAI => self.openai_api_key.as_ref(),
            LlmType::Anthropic => self.anthropic_api_key.as_ref(),
            LlmType::Gemini => self.google_api_key.as_ref(),
            LlmType::Groq => self.groq_api_key.as_ref(),
            LlmType::XAI => self.xai_api_key.as_ref(),
            LlmType::DeepSeek => self.deepseek_api_key.as_ref(),
        };
        self.ai_api_key
            .as_ref()
            .or(specific)
            .filter(|k| !k.trim().is_empty())
            .cloned()
    }

    pub fn llm_config(&self, role: ModelRole) -> Result<LlmConfig, ConfigError> {
        let provider = self.provider()?;
        let api_key = self.api_key(provider);
        if provider.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingApiKey(provider.to_string()));
        }

        let model = match role {
            ModelRole::Router => self.router_model.clone(),
            ModelRole::Agent => self.agent_model.clone(),
        };

        let mut config = LlmConfig::new(provider, role);
        config.api_key = api_key;
        config.base_url = self.ai_base_url.clone().filter(|u| !u.trim().is_empty());
        config.timeout = Duration::from_secs(self.llm_timeout_secs.max(1));
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            config.model = model;
        }
        Ok(config)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origin
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_window_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CONTEXT_WINDOW_SIZE",
                reason: "must be at least 1".into(),
            });
        }
        if self.compaction_threshold < self.context_window_size {
            return Err(ConfigError::Invalid {
                name: "COMPACTION_THRESHOLD",
                reason: format!("must not be below CONTEXT_WINDOW_SIZE ({})", self.context_window_size),
            });
        }
        if self.agent_max_steps == 0 {
            return Err(ConfigError::Invalid { name: "AGENT_MAX_STEPS", reason: "must be at least 1".into() });
        }
        if self.rate_limit_max_requests == 0 || self.global_rate_per_second == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT_MAX_REQUESTS",
                reason: "rate limits must be positive".into(),
            });
        }
        if self.jwt_access_secret.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Invalid { name: "JWT_ACCESS_SECRET", reason: "is required".into() });
        }
        self.provider()?;
        Ok(())
    }
}
