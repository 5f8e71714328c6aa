//! Command handlers

mod device_groups;
mod projects;
mod run;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

pub use run::RunArgs;

/// Top-level subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a test run to the device cloud
    Run(Box<RunArgs>),
    /// List cloud projects visible to the account
    Projects,
    /// List device groups available to the account
    DeviceGroups,
}

/// Route subcommands to their handlers
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => run::handle_run(*args, config).await,
        Commands::Projects => projects::list_projects(config).await,
        Commands::DeviceGroups => device_groups::list_device_groups(config).await,
    }
}
