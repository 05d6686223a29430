//! offgrid server entry point.
//!
//! Loads configuration, installs and activates the configured cache
//! generation, then serves the MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use offgrid_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(origin = %config.origin, store = %config.store_name(), "Starting offgrid server on stdio transport");

    let state = Arc::new(state::AppState::open(config).await.context("opening cache database")?);
    state.lifecycle.open_client("stdio");
    state.bootstrap().await;

    let handler = handler::OffgridServer::new(state.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    state.lifecycle.close_client("stdio");

    Ok(())
}
