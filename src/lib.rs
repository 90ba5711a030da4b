pub mod agents;
pub mod cli;
pub mod commerce;
pub mod config;
pub mod history;
pub mod llm;
pub mod markers;
pub mod models;
pub mod orchestrator;
pub mod server;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tools;

use cli::Args;
use log::info;
use server::{ AppState, Server };
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("AI Provider: {}", args.ai_provider);
    info!("Router Model: {}", args.router_model.as_deref().unwrap_or("(provider default)"));
    info!("Agent Model: {}", args.agent_model.as_deref().unwrap_or("(provider default)"));
    info!("Agent Max Steps: {}", args.agent_max_steps);
    info!("Context Window: {} (compaction above {})", args.context_window_size, args.compaction_threshold);
    info!("History Store Type: {}", args.history_type);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("Rate Limit: {} requests / {}ms", args.rate_limit_max_requests, args.rate_limit_window_ms);
    info!("JWT Secret: {}", if args.jwt_access_secret.is_some() { "set" } else { "missing" });
    info!("Demo Data: {}", if args.seed_demo_data { args.demo_user_id.as_str() } else { "off" });
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let state = AppState::from_args(&args).await?;

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await?;

    Ok(())
}
