use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use hiproute::{config::Config, core::RouterRegistry, logging, store::ConnectorCache};

#[derive(Parser)]
#[command(name = "hiproute")]
#[command(about = "Checks the routers of a hipache routing control plane", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "conf/config.yaml")]
    conf: String,

    /// Router to check, all configured routers when omitted
    #[arg(long = "router")]
    routers: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_from_yaml(&cli.conf) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let log_task = logging::init_logger(&config.log, shutdown.clone());

    let connectors = Arc::new(ConnectorCache::redis());
    let registry = RouterRegistry::from_config(&config, connectors.clone());

    let names = if cli.routers.is_empty() {
        registry.names()
    } else {
        cli.routers
    };
    if names.is_empty() {
        log::warn!("No routers configured in {}", cli.conf);
    }

    let mut failed = 0;
    for name in &names {
        let router = match registry.get(name) {
            Ok(router) => router,
            Err(e) => {
                log::error!("Router {name}: {e}");
                failed += 1;
                continue;
            }
        };
        match router.startup_message() {
            Ok(msg) => log::info!("{msg}"),
            Err(e) => log::warn!("Router {name}: {e}"),
        }
        match router.health_check(&shutdown).await {
            Ok(()) => log::info!("Router {name} is healthy"),
            Err(e) => {
                log::error!("Router {name} health check failed: {e}");
                failed += 1;
            }
        }
    }

    connectors.clear().await;
    shutdown.cancel();
    if let Some(task) = log_task {
        let _ = task.await;
    }

    if failed > 0 {
        eprintln!("{failed} of {} routers failed", names.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
