use log::debug;
use std::sync::Arc;

use crate::commerce::TieredLookup;
use crate::config::PromptConfig;
use crate::history::ConversationStore;
use crate::llm::chat::PromptMessage;
use crate::llm::gateway::AgentStream;
use crate::llm::{ ModelGateway, StepPolicy };
use crate::models::chat::{ AgentKind, HistoryMessage };
use crate::tools::billing::register_billing_tools;
use crate::tools::conversation::register_conversation_tools;
use crate::tools::order::register_order_tools;
use crate::tools::support::register_support_tools;
use crate::tools::ToolRegistry;

/// Static description served by the agents listing.
pub struct AgentProfile {
    pub kind: AgentKind,
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
}

pub const AGENT_PROFILES: [AgentProfile; 3] = [
    AgentProfile {
        kind: AgentKind::Support,
        name: "Support Agent",
        description: "Handles general support, FAQs, and troubleshooting.",
        capabilities: &[
            "Answer FAQs",
            "Provide troubleshooting steps",
            "Guide account settings",
            "Route to human when needed",
        ],
    },
    AgentProfile {
        kind: AgentKind::Order,
        name: "Order Agent",
        description: "Handles order status, tracking, and delivery questions.",
        capabilities: &[
            "Check order status",
            "Provide tracking information",
            "List recent orders",
            "Cancel eligible orders",
        ],
    },
    AgentProfile {
        kind: AgentKind::Billing,
        name: "Billing Agent",
        description: "Handles invoices, payments, and refunds.",
        capabilities: &["Show invoices", "Explain charges", "Check refund status", "Request refunds"],
    },
];

pub fn profile(kind: AgentKind) -> &'static AgentProfile {
    match kind {
        AgentKind::Support => &AGENT_PROFILES[0],
        AgentKind::Order => &AGENT_PROFILES[1],
        AgentKind::Billing => &AGENT_PROFILES[2],
    }
}

/// One request handed to a specialist. `history` already ends with the new
/// user message.
pub struct AgentRequest<'a> {
    pub user_message: &'a str,
    pub user_id: &'a str,
    pub conversation_id: &'a str,
    pub history: Vec<HistoryMessage>,
}

/// Data the specialists' tools read and write.
#[derive(Clone)]
pub struct AgentResources {
    pub lookup: TieredLookup,
    pub conversations: Arc<dyn ConversationStore>,
}

#[derive(Clone)]
pub struct SpecialistAgent {
    kind: AgentKind,
    prompt: String,
    gateway: ModelGateway,
    resources: AgentResources,
    policy: StepPolicy,
}

impl SpecialistAgent {
    pub fn new(
        kind: AgentKind,
        prompt: impl Into<String>,
        gateway: ModelGateway,
        resources: AgentResources,
        policy: StepPolicy
    ) -> Self {
        Self { kind, prompt: prompt.into(), gateway, resources, policy }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// The domain tools of this agent, bound to the caller, plus the
    /// conversation-history tool bound to the current conversation.
    pub fn tool_registry(&self, user_id: &str, conversation_id: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        match self.kind {
            AgentKind::Order => {
                register_order_tools(&mut registry, self.resources.lookup.primary().clone(), user_id);
            }
            AgentKind::Billing => {
                register_billing_tools(&mut registry, self.resources.lookup.clone(), user_id);
            }
            AgentKind::Support => {
                register_support_tools(&mut registry, self.resources.lookup.clone());
            }
        }
        register_conversation_tools(&mut registry, self.resources.conversations.clone(), conversation_id);
        registry
    }

    pub fn execute(&self, request: AgentRequest<'_>) -> AgentStream {
        let tools = self.tool_registry(request.user_id, request.conversation_id);
        debug!(
            "{} agent answering {:?} with tools {:?}",
            self.kind,
            request.user_message,
            tools.names()
        );

        let mut messages = Vec::with_capacity(request.history.len() + 1);
        messages.push(PromptMessage::system(self.prompt.clone()));
        messages.extend(request.history.iter().map(PromptMessage::from));

        self.gateway.stream(messages, Some(Arc::new(tools)), self.policy)
    }
}

/// One specialist per kind, sharing a gateway and resources.
#[derive(Clone)]
pub struct AgentSet {
    order: SpecialistAgent,
    billing: SpecialistAgent,
    support: SpecialistAgent,
}

impl AgentSet {
    pub fn new(gateway: ModelGateway, prompts: &PromptConfig, resources: AgentResources, policy: StepPolicy) -> Self {
        let build = |kind: AgentKind| {
            SpecialistAgent::new(kind, prompts.agent(kind), gateway.clone(), resources.clone(), policy)
        };
        Self {
            order: build(AgentKind::Order),
            billing: build(AgentKind::Billing),
            support: build(AgentKind::Support),
        }
    }

    pub fn get(&self, kind: AgentKind) -> &SpecialistAgent {
        match kind {
            AgentKind::Order => &self.order,
            AgentKind::Billing => &self.billing,
            AgentKind::Support => &self.support,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{ FallbackCatalog, InMemoryCommerceStore };
    use crate::history::InMemoryConversationStore;
    use crate::llm::chat::PromptRole;
    use crate::test_utils::{ ScriptedChatClient, StepScript };
    use crate::tools::billing::BILLING_TOOL_NAMES;
    use crate::tools::conversation::HISTORY_TOOL_NAME;
    use crate::tools::order::ORDER_TOOL_NAMES;
    use crate::tools::support::SUPPORT_TOOL_NAMES;
    use futures::StreamExt;
    use std::time::Duration;

    fn agents(client: Arc<ScriptedChatClient>) -> AgentSet {
        let resources = AgentResources {
            lookup: TieredLookup::new(
                Arc::new(InMemoryCommerceStore::new()),
                Arc::new(FallbackCatalog::builtin())
            ),
            conversations: Arc::new(InMemoryConversationStore::new()),
        };
        AgentSet::new(
            ModelGateway::new(client, Duration::from_secs(5)),
            &PromptConfig::builtin().unwrap(),
            resources,
            StepPolicy::default()
        )
    }

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names
            .iter()
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn billing_agent_gets_billing_tools_and_history_only() {
        let set = agents(Arc::new(ScriptedChatClient::new()));
        let registry = set.get(AgentKind::Billing).tool_registry("user_123", "conv-1");

        let mut expected = BILLING_TOOL_NAMES.to_vec();
        expected.push(HISTORY_TOOL_NAME);
        assert_eq!(registry.names(), sorted(&expected));
        assert!(ORDER_TOOL_NAMES.iter().all(|n| !registry.contains(n)));
    }

    #[test]
    fn order_and_support_agents_are_scoped_to_their_domain() {
        let set = agents(Arc::new(ScriptedChatClient::new()));

        let order = set.get(AgentKind::Order).tool_registry("u", "c");
        let mut expected = ORDER_TOOL_NAMES.to_vec();
        expected.push(HISTORY_TOOL_NAME);
        assert_eq!(order.names(), sorted(&expected));

        let support = set.get(AgentKind::Support).tool_registry("u", "c");
        let mut expected = SUPPORT_TOOL_NAMES.to_vec();
        expected.push(HISTORY_TOOL_NAME);
        assert_eq!(support.names(), sorted(&expected));
    }

    #[tokio::test]
    async fn execute_sends_policy_prompt_then_history() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push_step(StepScript::text(&["Your order ", "shipped."]));
        let set = agents(client.clone());

        let agent = set.get(AgentKind::Order);
        let stream = agent.execute(AgentRequest {
            user_message: "Where is my order?",
            user_id: "user_123",
            conversation_id: "conv-1",
            history: vec![HistoryMessage::user("Where is my order?")],
        });
        let text: Vec<String> = stream.text_stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(text.concat(), "Your order shipped.");

        let request = &client.step_requests()[0];
        assert_eq!(request.messages[0].role, PromptRole::System);
        assert!(request.messages[0].content.contains("Order Support Specialist"));
        assert_eq!(request.messages[1].content, "Where is my order?");
        assert_eq!(request.tools.len(), ORDER_TOOL_NAMES.len() + 1);
    }

    #[test]
    fn profiles_cover_every_agent() {
        for kind in AgentKind::ALL {
            assert_eq!(profile(kind).kind, kind);
            assert!(!profile(kind).capabilities.is_empty());
        }
    }
}
