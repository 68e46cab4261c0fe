use anyhow::{Context, Result};
use clap::Parser; // for cli
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api_gateway::{Args, Config, initialize_routes, server};

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<()> {
    // parse cli arguments
    let args = Args::parse();

    // a bad config file stops us before anything is served
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    config.apply_args(&args);
    config.validate()?;

    init_tracing(&config.logging.level)?;
    info!("Configuration loaded from {}", args.config.display());

    let app = initialize_routes(&config)?;

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    server::serve(listener, app, server::shutdown_signal()).await?;
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let level = level
        .parse::<tracing::Level>()
        .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("api_gateway={},tower_http=info", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
