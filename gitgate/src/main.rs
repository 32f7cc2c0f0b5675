mod commands;
mod config;
mod logging;
use anyhow::Result;
use clap::Parser;

use crate::config::GatewayArgs;
use crate::logging::init_logging;

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(flatten)]
    gateway: GatewayArgs,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the gateway
    Run,
    /// Validate the configuration and host key
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = crate::config::load_config(&cli.gateway)?;

    init_logging(&config.log.file)?;

    match &cli.command {
        Commands::Run => crate::commands::run::command(config).await,
        Commands::Check => crate::commands::check::command(config).await,
    }
}
