pub mod prompt;

pub use prompt::{ load_prompts, PromptConfig };

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid AI provider: {0}")]
    InvalidProvider(String),
    #[error("API key missing for selected AI provider \"{0}\"")]
    MissingApiKey(String),
    #[error("{0}")]
    Prompts(String),
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}
