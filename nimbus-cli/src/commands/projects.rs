//! Project listing
//!
//! Used to find the project id the `run` command needs.

use anyhow::Result;
use colored::*;

use nimbus_client::CloudClient;

use crate::config::Config;

pub async fn list_projects(config: &Config) -> Result<()> {
    let client = CloudClient::new(&config.cloud_url, &config.api_token);
    let projects = client.list_projects().await?;

    if projects.is_empty() {
        println!("{}", "No projects found.".yellow());
    } else {
        println!("{}", format!("Found {} project(s):", projects.len()).bold());
        println!();
        for project in projects {
            println!(
                "  {} {} {}",
                "▸".cyan(),
                project.name.bold(),
                format!("(id {})", project.id).dimmed()
            );
        }
    }

    Ok(())
}
