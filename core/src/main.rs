/// ChatLink client service - Main entry point
use chatlink_core::{api, ChatClient, Config};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Open the store and assemble the client
    let client = ChatClient::open(&config)
        .map_err(|e| anyhow::anyhow!("Startup error: {}", e))?;
    info!("🚀 Starting ChatLink client service");
    info!("   Data dir: {}", config.data_dir.display());

    // Serve the UI-facing API (this will block until shutdown)
    api::start_api(client, config.api_addr)
        .await
        .map_err(|e| anyhow::anyhow!("API error: {}", e))?;

    Ok(())
}
