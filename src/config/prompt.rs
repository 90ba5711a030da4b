use log::info;
use serde::Deserialize;
use std::fs;
use std::sync::Arc;

use super::ConfigError;
use crate::models::chat::AgentKind;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

/// System prompts for the router, the summarizer and each specialist.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub router: String,
    pub summarizer: String,
    pub order: String,
    pub billing: String,
    pub support: String,
}

/// Partial override file: any prompt left out keeps its built-in text.
#[derive(Deserialize, Debug, Default)]
struct PromptOverrides {
    router: Option<String>,
    summarizer: Option<String>,
    order: Option<String>,
    billing: Option<String>,
    support: Option<String>,
}

impl PromptConfig {
    pub fn builtin() -> Result<Self, ConfigError> {
        let config: PromptConfig = serde_json
            ::from_str(BUILTIN_PROMPTS)
            .map_err(|e| ConfigError::Prompts(format!("built-in prompts are invalid: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn agent(&self, kind: AgentKind) -> &str {
        match kind {
            AgentKind::Order => &self.order,
            AgentKind::Billing => &self.billing,
            AgentKind::Support => &self.support,
        }
    }

    fn apply(&mut self, overrides: PromptOverrides) {
        let PromptOverrides { router, summarizer, order, billing, support } = overrides;
        for (slot, value) in [
            (&mut self.router, router),
            (&mut self.summarizer, summarizer),
            (&mut self.order, order),
            (&mut self.billing, billing),
            (&mut self.support, support),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let entries = [
            ("router", &self.router),
            ("summarizer", &self.summarizer),
            ("order", &self.order),
            ("billing", &self.billing),
            ("support", &self.support),
        ];
        for (name, text) in entries {
            if text.trim().is_empty() {
                return Err(ConfigError::Prompts(format!("prompt '{}' is empty", name)));
            }
        }
        Ok(())
    }
}

fn parse_overrides(path: &str, content: &str) -> Result<PromptOverrides, ConfigError> {
    serde_json
        ::from_str(content)
        .map_err(|e| ConfigError::Prompts(format!("Failed to parse prompts file '{}': {}", path, e)))
}

/// Built-in prompts, with any prompt present in `path` replacing its default.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, ConfigError> {
    let mut config = PromptConfig::builtin()?;

    if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
        let content = fs
            ::read_to_string(path)
            .map_err(|e| ConfigError::Prompts(format!("Failed to read prompts file '{}': {}", path, e)))?;
        config.apply(parse_overrides(path, &content)?);
        config.validate()?;
        info!("Prompt overrides loaded from {}", path);
    }

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_agent_prompts_carry_marker_conventions() {
        let config = PromptConfig::builtin().unwrap();
        for kind in AgentKind::ALL {
            let prompt = config.agent(kind);
            assert!(prompt.contains("---OPTIONS---"), "{} prompt lacks options block", kind);
            assert!(prompt.contains("---ESCALATE---"), "{} prompt lacks escalation block", kind);
        }
        assert!(config.router.contains("JSON"));
    }

    #[test]
    fn override_replaces_only_named_prompts() {
        let mut config = PromptConfig::builtin().unwrap();
        let original_order = config.order.clone();
        config.apply(parse_overrides("inline", r#"{"billing": "Be brief."}"#).unwrap());
        assert_eq!(config.billing, "Be brief.");
        assert_eq!(config.order, original_order);
    }

    #[test]
    fn blank_override_is_rejected() {
        let mut config = PromptConfig::builtin().unwrap();
        config.apply(parse_overrides("inline", r#"{"router": "  "}"#).unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_override_file_is_an_error() {
        assert!(matches!(load_prompts(Some("/nonexistent/prompts.json")), Err(ConfigError::Prompts(_))));
        assert!(load_prompts(None).is_ok());
    }
}
