// Portal de Proveedores - Web Server

use anyhow::{Context, Result};
use clap::Parser;
use portal_proveedores::api::{build_router, AppState};
use portal_proveedores::{logging, open_database, PortalConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "portal-server", version, about = "Serve the supplier portal")]
struct Args {
    /// Config file (defaults to ./portal.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database, overrides [database] path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Overrides [web] host
    #[arg(long)]
    host: Option<String>,

    /// Overrides [web] port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = PortalConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }

    logging::init(&config.logging);

    let conn = open_database(&config.database.path)?;
    info!(path = %config.database.path.display(), "database opened");

    let app = build_router(AppState::new(conn, config.web.debug));

    let addr = config.web.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, debug = config.web.debug, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("could not install Ctrl+C handler, running until killed");
        std::future::pending::<()>().await;
    }
}
