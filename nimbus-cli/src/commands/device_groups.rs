//! Device group listing
//!
//! Used to find the device group id the `run` command needs.

use anyhow::Result;
use colored::*;

use nimbus_client::CloudClient;

use crate::config::Config;

pub async fn list_device_groups(config: &Config) -> Result<()> {
    let client = CloudClient::new(&config.cloud_url, &config.api_token);
    let groups = client.list_device_groups().await?;

    if groups.is_empty() {
        println!("{}", "No device groups found.".yellow());
    } else {
        println!("{}", format!("Found {} device group(s):", groups.len()).bold());
        println!();
        for group in groups {
            println!(
                "  {} {} {}",
                "▸".cyan(),
                format!("{} ({} device(s))", group.display_name, group.device_count).bold(),
                format!("(id {})", group.id).dimmed()
            );
        }
    }

    Ok(())
}
