//! Main binary for the gpumux daemon (gpumuxd)

use clap::{Parser, Subcommand};
use mux_agent::http::{router, AppState};
use mux_agent::{build_orchestrator, init_logging, AgentConfig, Result};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gpumuxd")]
#[command(about = "GPU resource manager daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Override configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate the default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start { ref config }) => {
            let config_path = config.clone().or(cli.config.clone());
            start_daemon(config_path, &cli).await
        }
        Some(Commands::Config { output }) => generate_config(output),
        Some(Commands::Validate { config }) => validate_config(config),
        None => {
            let config_path = cli.config.clone();
            start_daemon(config_path, &cli).await
        }
    }
}

async fn start_daemon(config_path: Option<PathBuf>, cli: &Cli) -> Result<()> {
    let mut config = if let Some(path) = config_path {
        AgentConfig::from_file(&path)?
    } else {
        AgentConfig::default()
    };

    if !cli.log_level.is_empty() {
        config.logging.level = cli.log_level.clone();
    }

    init_logging(&config.logging)?;
    info!(
        "gpumuxd {} starting, managing {} services",
        env!("CARGO_PKG_VERSION"),
        config.manager.services.len()
    );

    let orchestrator = build_orchestrator(&config).await?;
    let state = AppState {
        orchestrator: orchestrator.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.agent.bind_addr).await?;
    info!("listening on {}", config.agent.bind_addr);

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server failed: {}", e);
    }

    info!("shutting down");
    orchestrator.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    // Managed services are left exactly as they are; on the next start a
    // probe round rediscovers reality.
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(path) = output {
        config.to_file(&path)?;
        println!("Generated configuration file: {}", path.display());
    } else {
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| mux_agent::AgentError::config(format!("serialize failed: {}", e)))?;
        println!("{}", yaml);
    }

    Ok(())
}

fn validate_config(path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", path.display());

    let config = AgentConfig::from_file(&path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("Bind address: {}", config.agent.bind_addr);
    println!("GPU backend: {}", config.agent.gpu_backend);
    println!("Services:");
    for entry in &config.manager.services {
        println!(
            "  - {} ({}, {} MB, priority {})",
            entry.name, entry.kind, entry.vram_mb, entry.priority
        );
    }

    Ok(())
}
