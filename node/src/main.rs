// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Keybind Node
//!
//! Entry point for the `keybind-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the staking identity, and runs the
//! peer listener.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — create the data directory and a staking identity
//! - `node-id` — print the NodeID of an existing identity
//! - `version` — print build and protocol information

mod cli;
mod logging;
mod metrics;
mod peer;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use keybind_protocol::config;
use keybind_protocol::staking::StakingCredentials;
use keybind_protocol::upgrade::UpgradeSchedule;

use cli::{Commands, DataDirArgs, KeybindCli, RunArgs};
use metrics::NodeMetrics;
use peer::PeerContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = KeybindCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::NodeId(args) => print_node_id(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Load the upgrade schedule from `--upgrade-schedule`, or the built-in one.
fn load_schedule(args: &RunArgs) -> Result<UpgradeSchedule> {
    match &args.upgrade_schedule {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read upgrade schedule {}", path.display()))?;
            UpgradeSchedule::from_json(&json)
                .with_context(|| format!("invalid upgrade schedule {}", path.display()))
        }
        None => UpgradeSchedule::builtin().context("built-in upgrade schedule"),
    }
}

/// Starts the node: peer listener, bootstrap dials, metrics endpoint.
async fn run_node(args: RunArgs) -> Result<()> {
    let network_id = config::network_id_from_name(&args.network)
        .ok_or_else(|| anyhow!("unknown network {:?}", args.network))?;
    let epoch = load_schedule(&args)?.epoch(network_id);

    let (credentials, created) = StakingCredentials::load_or_generate(&args.data_dir)
        .with_context(|| format!("loading staking identity from {}", args.data_dir.display()))?;
    let node_id = credentials.node_id();

    tracing::info!(
        %node_id,
        network_id,
        %epoch,
        new_identity = created,
        listen = %args.listen,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting keybind-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Peers ---
    let public_addr = args.public_addr.unwrap_or(args.listen);
    let ctx = Arc::new(PeerContext::new(
        credentials,
        public_addr,
        epoch,
        Arc::clone(&node_metrics),
    )?);

    let peer_listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind peer listener on {}", args.listen))?;
    tracing::info!("peer listener on {}", args.listen);

    for addr in args.bootstrap.iter().copied() {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            match peer::dial(ctx, addr).await {
                Ok(()) => tracing::info!(%addr, "bootstrap peer closed the connection"),
                Err(e) => tracing::warn!(%addr, error = %format!("{e:#}"), "bootstrap dial failed"),
            }
        });
    }

    // --- Metrics server ---
    let metrics_router = metrics::router(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = peer::accept_loop(peer_listener, ctx) => {
            if let Err(e) = res {
                tracing::error!("peer listener error: {:#}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("keybind-node stopped");
    Ok(())
}

/// Creates the data directory and a staking identity, if missing.
fn init_node(args: DataDirArgs) -> Result<()> {
    let data_dir = &args.data_dir;
    let (credentials, created) = StakingCredentials::load_or_generate(data_dir)
        .with_context(|| format!("initializing {}", data_dir.display()))?;

    if created {
        println!("Node initialized successfully.");
    } else {
        println!("Node already initialized.");
    }
    println!("  Data directory : {}", data_dir.display());
    println!(
        "  Certificate    : {}",
        data_dir.join(keybind_protocol::staking::CERT_FILE_NAME).display()
    );
    println!(
        "  Private key    : {}",
        data_dir.join(keybind_protocol::staking::KEY_FILE_NAME).display()
    );
    println!("  NodeID         : {}", credentials.node_id());

    Ok(())
}

/// Prints the NodeID of the identity stored in the data directory.
fn print_node_id(args: DataDirArgs) -> Result<()> {
    let credentials = StakingCredentials::load(&args.data_dir)
        .with_context(|| format!("loading staking identity from {}", args.data_dir.display()))?;
    println!("{}", credentials.node_id());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("keybind-node      {}", env!("CARGO_PKG_VERSION"));
    println!("proof extension   {}", config::NODE_PROOF_OID_STR);
    println!("max certificate   {} bytes", config::MAX_CERTIFICATE_LEN);
    println!(
        "max clock skew    {}s",
        config::MAX_CLOCK_DIFFERENCE.as_secs()
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
