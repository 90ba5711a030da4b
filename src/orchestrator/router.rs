use log::{ debug, error };
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::llm::chat::PromptMessage;
use crate::llm::ModelGateway;
use crate::models::chat::HistoryMessage;
use crate::models::routing::{ RouteTarget, RouterResult };

const CONTEXT_LIMIT: usize = 6;
const CLASSIFY_MAX_TOKENS: u32 = 200;
const DEFAULT_CONFIDENCE: f64 = 0.5;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*?\}").unwrap());

static BILLING_WITH_ORDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(invoice|refund)\b").unwrap());
static ORDER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\border\b").unwrap());
static ORDER_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(order|cancel|delivery|tracking|shipped|package|shipping)\b").unwrap()
});
static BILLING_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(refund|invoice|billing|payment|charge|subscription|bill)\b").unwrap()
});
static SUPPORT_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(password|account|help|how|guide|faq|policy|reset|troubleshoot|support|who|what|identity)\b"
    ).unwrap()
});

/// Confidence cut-offs applied to a parsed classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterPolicy {
    /// Below this the route is `fallback` whatever the model said.
    pub fallback_below: f64,
    /// Below this an unrecognised agent name is sent to support.
    pub support_below: f64,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self { fallback_below: 0.4, support_below: 0.6 }
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    gateway: ModelGateway,
    instruction: String,
    policy: RouterPolicy,
}

impl IntentRouter {
    pub fn new(gateway: ModelGateway, instruction: impl Into<String>) -> Self {
        Self { gateway, instruction: instruction.into(), policy: RouterPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RouterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Never fails: a model error routes to support with confidence 0.5.
    pub async fn classify(&self, message: &str, context: &[HistoryMessage]) -> RouterResult {
        let skip = context.len().saturating_sub(CONTEXT_LIMIT);
        let mut prompt = Vec::with_capacity(CONTEXT_LIMIT + 2);
        prompt.push(PromptMessage::system(self.instruction.clone()));
        prompt.extend(context[skip..].iter().map(PromptMessage::from));
        prompt.push(PromptMessage::user(message));

        match self.gateway.generate(prompt, Some(CLASSIFY_MAX_TOKENS)).await {
            Ok(raw) => {
                let response = raw.trim();
                debug!("Router raw response: {}", response);
                self.parse_json(response).unwrap_or_else(|| keyword_route(message, response))
            }
            Err(e) => {
                error!("Router classification error: {}", e);
                RouterResult {
                    agent: RouteTarget::Support,
                    confidence: DEFAULT_CONFIDENCE,
                    reasoning: "Error during classification, defaulting to support".to_string(),
                }
            }
        }
    }

    fn parse_json(&self, response: &str) -> Option<RouterResult> {
        let span = JSON_OBJECT.find(response)?;
        let parsed: Value = serde_json::from_str(span.as_str()).ok()?;
        let object = parsed.as_object()?;

        let named = match
            object
                .get("agent")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_uppercase()
                .as_str()
        {
            "ORDER" => Some(RouteTarget::Order),
            "BILLING" => Some(RouteTarget::Billing),
            "SUPPORT" => Some(RouteTarget::Support),
            _ => None,
        };
        let confidence = object.get("confidence").and_then(Value::as_f64).unwrap_or(DEFAULT_CONFIDENCE);
        let reasoning = object
            .get("reasoning")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or(response)
            .to_string();

        let agent = if confidence < self.policy.fallback_below {
            RouteTarget::Fallback
        } else {
            match named {
                Some(agent) => agent,
                None if confidence < self.policy.support_below => RouteTarget::Support,
                None => RouteTarget::Fallback,
            }
        };

        Some(RouterResult { agent, confidence, reasoning })
    }
}

/// Deterministic routing used when the model did not answer in JSON.
/// The user's words decide first; the raw model text is only a tie-breaker.
fn keyword_route(message: &str, response: &str) -> RouterResult {
    let user = message.to_lowercase();
    let raw = response.to_lowercase();

    let (agent, confidence) = if BILLING_WITH_ORDER.is_match(&user) && ORDER_MENTION.is_match(&user) {
        (RouteTarget::Billing, 0.9)
    } else if ORDER_TERMS.is_match(&user) {
        (RouteTarget::Order, 0.85)
    } else if BILLING_TERMS.is_match(&user) {
        (RouteTarget::Billing, 0.85)
    } else if SUPPORT_TERMS.is_match(&user) {
        (RouteTarget::Support, 0.85)
    } else if raw.contains("order") {
        (RouteTarget::Order, 0.75)
    } else if raw.contains("billing") || raw.contains("refund") || raw.contains("invoice") {
        (RouteTarget::Billing, 0.75)
    } else if raw.contains("support") {
        (RouteTarget::Support, 0.75)
    } else {
        (RouteTarget::Support, 0.7)
    };

    RouterResult { agent, confidence, reasoning: response.to_string() }
}
