mod config;
mod db;
mod error;
mod mcp;
mod routes;
mod state;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::HubConfig;
use state::AppState;

#[derive(Parser)]
#[command(
    name = "market-data-hub",
    version,
    about = "Read-only candle, footprint, CVD and EMA queries over HTTP and MCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP query API (and the single-message MCP endpoint)
    Serve {
        /// Overrides HUB_BIND
        #[arg(long)]
        bind: Option<String>,
        /// Overrides HUB_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve MCP over stdin/stdout
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries MCP frames, so logs always go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = HubConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            if let Some(port) = port {
                cfg.port = port;
            }
            serve_http(cfg).await
        }
        Commands::Mcp => {
            let state = AppState::from_config(&cfg).context("failed to open market data store")?;
            mcp::serve_stdio(state).await.context("MCP stdio transport failed")
        }
    }
}

async fn serve_http(cfg: HubConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg).context("failed to open market data store")?;

    let app = Router::new()
        .merge(routes::api_router())
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.bind, cfg.port))?;

    tracing::info!("Market data hub listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
