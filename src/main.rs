use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use interview_coach::{
    config::{Config, LogFormat},
    server::{AppState, McpServer},
};

/// Adaptive interview-practice coach served over MCP stdio.
#[derive(Parser, Debug)]
#[command(name = "interview-coach", version, about)]
struct Cli {
    /// Context graph database path (overrides DATABASE_PATH)
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Log level or filter directive (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: pretty or json (overrides LOG_FORMAT)
    #[arg(long)]
    log_format: Option<String>,

    /// Run without the context graph; history and fact-checks stay empty
    #[arg(long)]
    no_graph: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdin/stdout (the default)
    Serve,
    /// Print a learner's stored profile as JSON and exit
    Profile {
        /// Learner identifier
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &cli);

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Interview coach starting..."
    );

    let state = match AppState::from_config(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Profile { user_id } => {
            let profile = state.orchestrator.user_profile(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Serve => {
            let server = McpServer::new(state);

            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(path) = &cli.database_path {
        config.database.path = path.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
    }
    if cli.no_graph {
        config.database.enabled = false;
    }
}

/// Initialize tracing/logging. Logs go to stderr; stdout carries the protocol.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
