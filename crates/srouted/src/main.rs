//! srouted entry point.
//!
//! Loads the daemon tuning and a static fabric description, then keeps the
//! fabric's routes programmed until interrupted.

use clap::Parser;
use sonic_sr_types::NodeId;
use sonic_srouted::election::InMemoryOwnershipStore;
use sonic_srouted::fabric::{DryRunProgrammer, FabricConfig, StaticFabric};
use sonic_srouted::{FabricServices, RoutingConfig, RoutingDaemon, RoutingError, RoutingHandler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Segment routing fabric controller
#[derive(Parser, Debug)]
#[command(name = "srouted")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration file
    #[arg(short = 'c', long, default_value = "/etc/sonic/srouted.toml")]
    config: PathBuf,

    /// Static fabric description
    #[arg(short = 'f', long)]
    fabric: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Identity of this controller instance, overrides the fabric file
    #[arg(short = 'n', long)]
    node_id: Option<NodeId>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("srouted: Starting segment routing controller");
    match run_daemon(args).await {
        Ok(()) => {
            info!("srouted: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "srouted: Daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

async fn run_daemon(args: Args) -> Result<(), RoutingError> {
    let config = RoutingConfig::load_or_default(&args.config)?;
    let fabric_config = FabricConfig::load(&args.fabric)?;
    let local_node = args
        .node_id
        .or_else(|| fabric_config.local_node.clone())
        .ok_or_else(|| RoutingError::Config("no local node id configured".to_string()))?;
    info!(node = %local_node, devices = fabric_config.devices.len(), "srouted: Fabric loaded");

    let fabric = Arc::new(StaticFabric::new(fabric_config, local_node));
    let programmer = Arc::new(DryRunProgrammer::new(fabric.clone()));
    let services = FabricServices {
        topology: fabric.clone(),
        config: fabric.clone(),
        mastership: fabric.clone(),
        cluster: fabric,
        rules: programmer.clone(),
        groups: programmer,
        ownership: Arc::new(InMemoryOwnershipStore::new()),
    };

    let queue_depth = config.routing.trigger_queue_depth;
    let routing = Arc::new(RoutingHandler::new(services, config));
    // The static fabric never changes, so nothing feeds the channel.
    let (daemon, _events) = RoutingDaemon::new(routing, queue_depth);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("srouted: Received SIGINT/SIGTERM");
            shutdown.cancel();
        }
    });

    daemon.run(cancel).await;
    info!("srouted: Graceful shutdown complete");
    Ok(())
}
