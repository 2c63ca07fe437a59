use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use shufflehub_cluster::CoordinatorServer;
use shufflehub_core::config::Role as ConfigRole;
use shufflehub_core::{bootstrap::load_config, logging, CoordinatorClient};
use shufflehub_server::ShuffleServer;

#[derive(Parser, Debug)]
#[command(name = "shufflehub")]
#[command(about = "Shuffle service coordinator and shuffle server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run the coordinator
    Coordinator {
        /// Config file path
        #[arg(long, env = "SHUFFLEHUB_CONFIG_PATH")]
        config: Option<String>,
    },
    /// Run a shuffle server reporting to a coordinator
    Server {
        /// Config file path
        #[arg(long, env = "SHUFFLEHUB_CONFIG_PATH")]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.role {
        Role::Coordinator { config } => run_coordinator(config.as_deref()).await,
        Role::Server { config } => run_server(config.as_deref()).await,
    }
}

async fn run_coordinator(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path, ConfigRole::Coordinator)?;
    logging::init_logging(&config.logging)?;
    info!("Coordinator starting on {}", config.coordinator.bind_address());

    let mut coordinator = CoordinatorServer::new(&config.coordinator);
    let listener = coordinator.bind().await?;
    coordinator.start_background_tasks();
    let http_handle = coordinator.serve(listener);

    shutdown_signal().await;
    coordinator.shutdown().await;
    if let Err(e) = http_handle.await {
        error!("Coordinator HTTP task failed: {}", e);
    }

    info!("Coordinator stopped");
    Ok(())
}

async fn run_server(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path, ConfigRole::Server)?;
    logging::init_logging(&config.logging)?;
    info!("Shuffle server reporting to {}", config.server.coordinator_url);

    let client = CoordinatorClient::new(config.server.coordinator_url.clone())?;
    let mut server = ShuffleServer::new(&config.server, Arc::new(client))?;
    server.start().await;

    shutdown_signal().await;
    server.shutdown().await;

    info!("Shuffle server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
