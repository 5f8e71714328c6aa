//! Nimbus CLI
//!
//! Pipeline front end for running mobile-app tests in the device cloud:
//! collects the job description from flags and environment variables,
//! submits it through the engine and maps the outcome to an exit code.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Run mobile-app tests in the device cloud", long_about = None)]
struct Cli {
    /// Cloud REST endpoint
    #[arg(long, env = "NIMBUS_CLOUD_URL")]
    cloud_url: String,

    /// API token used as bearer auth
    #[arg(long, env = "NIMBUS_API_TOKEN", hide_env_values = true)]
    api_token: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config {
        cloud_url: cli.cloud_url,
        api_token: cli.api_token,
    };

    handle_command(cli.command, &config).await
}
