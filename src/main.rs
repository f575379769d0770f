use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adwatch::cli::{commands, Cli, Commands};
use adwatch::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adwatch=info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            interval,
            no_initial_cycle,
        } => {
            commands::run(config, interval.as_deref(), no_initial_cycle).await?;
        }
        Commands::Once => {
            commands::once(config).await?;
        }
        Commands::Known { limit } => {
            commands::known(config, limit)?;
        }
    }

    Ok(())
}
