use crypto_chat_agent::{api::start_server, config::AppConfig, SessionFactory};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Loads .env before reading variables
    let config = AppConfig::from_env()?;

    if config.llm.api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
    }

    info!("🚀 Crypto Chat Agent - API Server");
    info!("📍 Port: {}", config.port);

    let factory = SessionFactory::from_config(&config)?;

    info!("✅ Session factory initialized");
    info!("📡 Starting API server...");

    start_server(factory, &config.sessions, config.port).await?;

    Ok(())
}
