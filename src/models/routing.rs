use serde::{ Deserialize, Serialize };

use super::chat::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteTarget {
    Order,
    Billing,
    Support,
    Fallback,
}

impl RouteTarget {
    /// Concrete specialist for this route. Anything unrouted lands on support.
    pub fn agent_kind(&self) -> AgentKind {
        match self {
            RouteTarget::Order => AgentKind::Order,
            RouteTarget::Billing => AgentKind::Billing,
            RouteTarget::Support | RouteTarget::Fallback => AgentKind::Support,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterResult {
    pub agent: RouteTarget,
    pub confidence: f64,
    pub reasoning: String,
}
