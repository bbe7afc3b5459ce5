//! LQD daemon.
//!
//! `lqdd` mirrors data from the configured upstream monitoring cores and
//! answers LQL queries on the listen address. Graceful shutdown on
//! SIGTERM/ctrl-c.
//!
//! # Usage
//!
//! ```bash
//! # start with a configuration file
//! lqdd --config /etc/lqd/lqd.toml
//!
//! # override the listen address
//! lqdd --listen 127.0.0.1:7557
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lqd_cluster::{Node, NodeAccessor, TcpNodeClient};
use lqd_query::Engine;
use lqd_schema::Catalog;
use lqd_server::{run_listener, ProxyContext, ServerConfig};
use lqd_store::{Interner, Peer, TableSignals};

/// LQD proxy daemon
#[derive(Parser, Debug)]
#[command(
    name = "lqdd",
    version,
    about = "Consolidating proxy for livestatus-compatible monitoring cores"
)]
struct Args {
    /// Listen address for LQL clients
    #[arg(short, long, env = "LQD_LISTEN")]
    listen: Option<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "LQD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "LQD_LOG_LEVEL")]
    log_level: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    run_server(config).await
}

fn init_logging(args: &Args) {
    let level = if args.verbose { "debug" } else { &args.log_level };
    let filter = EnvFilter::try_new(format!(
        "lqd_server={level},lqd_query={level},lqd_store={level},lqd_cluster={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path).context("failed to load config file")?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = &args.listen {
        config.listen = vec![listen.clone()];
    }
    Ok(config)
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let catalog = Arc::new(Catalog::new());
    let interner = Arc::new(Interner::new());
    let signals = Arc::new(TableSignals::new());
    let engine = Arc::new(Engine::new(
        Arc::clone(&catalog),
        config.engine_options(),
        Arc::clone(&signals),
    ));

    for connection in &config.connections {
        let addr = connection.source.first().cloned().unwrap_or_default();
        let peer = Peer::new(
            connection.id.clone(),
            connection.name.clone(),
            addr,
            Arc::clone(&catalog),
            Arc::clone(&interner),
            Arc::clone(&signals),
        );
        info!("registered backend {} ({})", connection.id, connection.name);
        engine.add_peer(Arc::new(peer));
    }
    if config.connections.is_empty() {
        warn!("no connections configured, serving empty tables");
    }

    let cluster = if config.is_clustered() {
        let nodes: Vec<Node> = config
            .nodes
            .iter()
            .map(|n| Node::from_config(n, &config.node_id))
            .collect();
        info!("clustered mode with {} nodes", nodes.len());
        Some(Arc::new(NodeAccessor::new(
            nodes,
            Arc::new(TcpNodeClient),
        )))
    } else {
        None
    };

    let ctx = Arc::new(ProxyContext { engine, cluster });

    let listen = config
        .listen
        .first()
        .context("no listen address configured")?;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    info!("listening on {}", listen);

    tokio::select! {
        result = run_listener(listener, ctx) => {
            if let Err(err) = result {
                anyhow::bail!("listener failed: {}", err);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
