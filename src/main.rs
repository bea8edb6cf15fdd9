//! Binary entry point (A5): CLI parsing, tracing setup, and handing a
//! loaded `Config` to `web::WebServer`, mirroring the teacher's `main.rs`
//! shape (clap CLI overriding a figment-loaded config, `tracing_subscriber`
//! initialized before anything else runs) reduced to this core's fields.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_proxy_core::config::Config;
use media_proxy_core::web::WebServer;

#[derive(Parser)]
#[command(name = "media-proxy-core")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Range-aware slice cache and HLS manifest rewriter")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("media_proxy_core={}", cli.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting media-proxy-core v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    tracing::info!(config_file = %cli.config, "configuration loaded");

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let server = WebServer::new(config)?;
    tracing::info!(host = %server.host(), port = server.port(), "binding listener");
    server.serve().await
}
