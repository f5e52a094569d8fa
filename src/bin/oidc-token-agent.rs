use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use oidc_token_agent::config::proc_loader::file_to_config;
use oidc_token_agent::resilience::retry::RetrySettings;
use oidc_token_agent::server;
use oidc_token_agent::utils::constants::DEFAULT_CONFIG_PATH;
use oidc_token_agent::utils::logging::{self, LogLevel};
use oidc_token_agent::TokenManager;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a valid access token (default)
    Token {
        /// print `Authorization: Bearer <token>` instead of the bare token
        #[arg(long)]
        header: bool,
    },
    /// Drop the cached token so the next call requests a new one
    Invalidate,
    /// Serve the token and metrics over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = file_to_config(Path::new(&args.config)).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Token manager
    // -------------------------------

    let manager = TokenManager::from_config(&service_config)?;

    match args.command.unwrap_or(Command::Token { header: false }) {
        Command::Token { header } => {
            let retry = RetrySettings::from(service_config.settings.retry.as_ref());
            let token = retry.run_with_retry(|| manager.get_token()).await?;
            if header {
                println!("Authorization: {}", token.authorization_header());
            } else {
                println!("{}", token.value);
            }
        }
        Command::Invalidate => {
            manager.invalidate().await;
            info!("token invalidated, file '{}'", manager.token_file().display());
        }
        Command::Serve => {
            info!("Service starting...");
            server::server::start(&service_config.settings, manager).await?;
        }
    }

    Ok(())
}
