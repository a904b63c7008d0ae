//! Module gateway host binary.
//!
//! Loads the configuration, registers the demo `echo` module and serves
//! until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use module_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use module_gateway::lifecycle::{signals, Shutdown};
use module_gateway::module::{EchoModule, Module, ModuleRegistry};
use module_gateway::observability::{logging, metrics};
use module_gateway::routing::RouteHooks;
use module_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "module-gateway")]
#[command(about = "Pluggable HTTP/WebSocket module gateway", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload response settings when the configuration file changes
    #[arg(short, long, requires = "config")]
    watch: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        worker_threads = config.listener.worker_threads,
        "module-gateway starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.listener.worker_threads.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(serve(cli, config))
}

async fn serve(cli: Cli, config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Metrics endpoint
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // 2. Modules
    let registry = Arc::new(ModuleRegistry::new());
    registry.register("echo", Module::dual(EchoModule))?;
    let hooks = Arc::new(RouteHooks::new());

    // 3. Optional hot reload; the watcher stops when dropped
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    // 4. Listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // 5. Serve until a stop signal
    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_handler(&shutdown);
    let server = GatewayServer::new(config, registry, hooks);
    server.run(listener, config_updates, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
