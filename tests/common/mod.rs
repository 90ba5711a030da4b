//! Builds the full router over scripted models and in-memory stores.

use axum::body::{ to_bytes, Body };
use axum::http::{ header, Method, Request, Response };
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use tower::ServiceExt;

use helpdesk_agent::agents::{ AgentResources, AgentSet };
use helpdesk_agent::commerce::{ FallbackCatalog, InMemoryCommerceStore, TieredLookup };
use helpdesk_agent::config::PromptConfig;
use helpdesk_agent::history::InMemoryConversationStore;
use helpdesk_agent::llm::{ LlmType, ModelGateway, StepPolicy };
use helpdesk_agent::orchestrator::{ ChatService, ContextCompactor, IntentRouter };
use helpdesk_agent::server::auth::JwtKeys;
use helpdesk_agent::server::rate_limit::{ global_guard, FixedWindowLimiter };
use helpdesk_agent::server::{ build_router, AiInfo, AppState };
use helpdesk_agent::test_utils::{ ManualClock, ScriptedChatClient };

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryConversationStore>,
    pub router_client: Arc<ScriptedChatClient>,
    pub agent_client: Arc<ScriptedChatClient>,
    pub jwt: JwtKeys,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_rate_limit(1000).await
    }

    pub async fn with_rate_limit(max_requests: u32) -> Self {
        let store = Arc::new(InMemoryConversationStore::new());
        let router_client = Arc::new(ScriptedChatClient::new());
        let agent_client = Arc::new(ScriptedChatClient::new());
        let prompts = PromptConfig::builtin().unwrap();

        let commerce = Arc::new(InMemoryCommerceStore::new());
        commerce.seed_demo("user_123").await;

        let router_gateway = ModelGateway::new(router_client.clone(), Duration::from_secs(5));
        let agent_gateway = ModelGateway::new(agent_client.clone(), Duration::from_secs(5));
        let resources = AgentResources {
            lookup: TieredLookup::new(commerce, Arc::new(FallbackCatalog::builtin())),
            conversations: store.clone(),
        };

        let chat = ChatService::new(
            store.clone(),
            ContextCompactor::new(router_gateway.clone(), prompts.summarizer.clone()),
            IntentRouter::new(router_gateway, prompts.router.clone()),
            AgentSet::new(agent_gateway, &prompts, resources, StepPolicy::default())
        );

        let jwt = JwtKeys::new(SECRET);
        let state = AppState {
            chat,
            jwt: jwt.clone(),
            limiter: Arc::new(
                FixedWindowLimiter::new(max_requests, Duration::from_secs(60), Arc::new(ManualClock::default()))
            ),
            global_guard: Arc::new(global_guard(10_000)),
            ai: AiInfo {
                provider: LlmType::Ollama,
                router_model: "scripted".into(),
                agent_model: "scripted".into(),
            },
            started_at: Instant::now(),
        };

        Self { router: build_router(state, &[]), store, router_client, agent_client, jwt }
    }

    pub fn token(&self, user_id: &str) -> String {
        self.jwt.sign_access_token(user_id, None, chrono::Duration::minutes(15)).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) =>
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
