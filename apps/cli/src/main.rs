mod adapt;
mod config;
mod errors;
mod llm_client;
mod progress;
mod render;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (aborts on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cvtailor v{}", env!("CARGO_PKG_VERSION"));

    let gateway = LlmClient::new(&config);
    info!("LLM gateway initialized (provider: {})", gateway.provider());

    adapt::run(&config, &gateway).await?;

    Ok(())
}
