//! sync-clipboard - encrypted clipboard synchronization
//!
//! This is the main entry point for the sync-clipboard binary.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sync_clipboard::cli::{Cli, CliHandler, Commands, ConfigAction};
use sync_clipboard::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // `config init` writes the file that would otherwise be loaded here
    let config = match cli.command {
        Commands::Config {
            action: ConfigAction::Init { .. },
        } => Config::default(),
        _ => Config::load(cli.config.as_deref())?,
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sync_clipboard={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("sync-clipboard v{}", sync_clipboard::VERSION);

    let handler = CliHandler::new(config, cli.config);
    handler.handle_command(cli.command).await?;

    Ok(())
}
