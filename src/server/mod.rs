pub mod api;
pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod stream;

use axum::extract::Request;
use axum::http::{ header, HeaderName, HeaderValue, Method };
use axum::middleware::{ self, Next };
use axum::response::Response;
use axum::routing::{ get, post };
use axum::Router;
use log::{ error, info, warn };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };

use crate::agents::{ AgentResources, AgentSet };
use crate::cli::Args;
use crate::commerce::{ FallbackCatalog, InMemoryCommerceStore, TieredLookup };
use crate::config::load_prompts;
use crate::history::initialize_history_store;
use crate::llm::{ LlmType, ModelGateway, ModelRole, StepPolicy };
use crate::orchestrator::{ ChatService, ContextCompactor, IntentRouter };
use self::auth::JwtKeys;
use self::rate_limit::{ global_guard, FixedWindowLimiter, GlobalGuard, SystemClock };

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";
pub const AGENT_TYPE_HEADER: &str = "x-agent-type";

/// Which models answer, for the health endpoint.
#[derive(Debug, Clone)]
pub struct AiInfo {
    pub provider: LlmType,
    pub router_model: String,
    pub agent_model: String,
}

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub jwt: JwtKeys,
    pub limiter: Arc<FixedWindowLimiter>,
    pub global_guard: Arc<GlobalGuard>,
    pub ai: AiInfo,
    pub started_at: Instant,
}

impl AppState {
    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        args.validate()?;

        let prompts = load_prompts(args.prompts_path.as_deref())?;
        let router_gateway = ModelGateway::from_config(&args.llm_config(ModelRole::Router)?)?;
        let agent_gateway = ModelGateway::from_config(&args.llm_config(ModelRole::Agent)?)?;

        let conversations = initialize_history_store(args)?;
        let commerce = Arc::new(InMemoryCommerceStore::new());
        if args.seed_demo_data {
            commerce.seed_demo(&args.demo_user_id).await;
            info!("Seeded demo orders and invoices for {}", args.demo_user_id);
        }
        let resources = AgentResources {
            lookup: TieredLookup::new(commerce, Arc::new(FallbackCatalog::builtin())),
            conversations: conversations.clone(),
        };

        let ai = AiInfo {
            provider: agent_gateway.provider(),
            router_model: router_gateway.model(),
            agent_model: agent_gateway.model(),
        };

        let chat = ChatService::new(
            conversations,
            ContextCompactor::new(router_gateway.clone(), prompts.summarizer.clone()).with_limits(
                args.context_window_size,
                args.compaction_threshold
            ),
            IntentRouter::new(router_gateway, prompts.router.clone()),
            AgentSet::new(agent_gateway, &prompts, resources, StepPolicy::with_max_steps(args.agent_max_steps))
        );

        let limiter = FixedWindowLimiter::new(
            args.rate_limit_max_requests,
            Duration::from_millis(args.rate_limit_window_ms),
            Arc::new(SystemClock)
        );

        Ok(Self {
            chat,
            jwt: JwtKeys::new(args.jwt_access_secret.as_deref().unwrap_or_default()),
            limiter: Arc::new(limiter),
            global_guard: Arc::new(global_guard(args.global_rate_per_second)),
            ai,
            started_at: Instant::now(),
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let exposed = [HeaderName::from_static(CONVERSATION_ID_HEADER), HeaderName::from_static(AGENT_TYPE_HEADER)];

    if origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any).expose_headers(exposed);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim_end_matches('/'))
        .filter_map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| warn!("Ignoring invalid CORS origin: {}", o))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(exposed)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    info!("{} {} -> {} ({}ms)", method, path, response.status().as_u16(), start.elapsed().as_millis());
    response
}

/// All routes, mounted under `/api`, with auth, rate limiting, CORS and
/// request logging applied.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/chat/messages", post(api::send_message))
        .route("/chat/conversations", get(api::list_conversations))
        .route("/chat/conversations/{id}", get(api::get_conversation).delete(api::delete_conversation))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    let public = Router::new()
        .route("/health", get(api::health))
        .route("/agents", get(api::list_agents))
        .route("/agents/classify", post(api::classify))
        .route("/agents/{kind}/capabilities", get(api::agent_capabilities));

    Router::new()
        .nest("/api", public.merge(protected))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(cors_layer(cors_origins))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let limiter = self.state.limiter.clone();
        let app = build_router(self.state, &self.args.cors_origins());

        let sweep_every = Duration::from_millis(self.args.rate_limit_window_ms.max(1000));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            loop {
                interval.tick().await;
                let purged = limiter.purge_expired();
                if purged > 0 {
                    info!("Purged {} expired rate-limit windows", purged);
                }
            }
        });

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
                info!("Starting HTTPS server on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            (true, _, _) => {
                error!("ENABLE_TLS is set but TLS_CERT_PATH or TLS_KEY_PATH is missing");
                return Err("TLS enabled without certificate and key paths".into());
            }
            _ => {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!("Starting HTTP server on: http://{}", addr);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
