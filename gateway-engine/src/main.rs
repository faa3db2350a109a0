//! Binary entry point: loads `AppConfig` from the environment, opens the
//! `JsonFileStore`, wires `AppState`, and serves the axum router with
//! graceful shutdown on `Ctrl+C` so in-flight video polling ticks get a
//! cancellation signal instead of being killed mid-write.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gateway_config::AppConfig;
use gateway_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use gateway_server::{router, AppState};
use gateway_store::JsonFileStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gateway-engine")]
#[command(about = "Recruiting LLM task-orchestration gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the HTTP server. `--host`/`--port` override `GATEWAY_BIND_ADDR`/`GATEWAY_BIND_PORT`.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Command::Serve { host, port } = cli.command;

    let config = Arc::new(AppConfig::from_env().context("loading configuration from environment")?);

    let logs_dir = canonical_logs_dir_from_root(&config.store_dir);
    let (_log_guard, _log_info) = init_process_logging(ProcessKind::Engine, &logs_dir, 14)
        .context("initializing process logging")?;

    let store = Arc::new(JsonFileStore::open(&config.store_dir).await.context("opening document store")?);
    let host = host.unwrap_or_else(|| config.bind_addr.clone());
    let port = port.unwrap_or(config.bind_port);
    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid host or port")?;

    let state = AppState::build(config, store);
    let app = router(state);

    info!(%addr, "starting gateway-engine");
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received ctrl-c, shutting down gracefully");
}
