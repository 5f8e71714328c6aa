//! Engine configuration
//!
//! Connection settings for the cloud plus the knobs of the completion
//! machinery. Values come from the front end or from environment
//! variables; either way `validate` runs before the engine is built.

use std::time::Duration;

/// Path the self-hosted callback listener serves.
pub const HOOK_PATH: &str = "/api/cloud-webhook";

/// Free-tier execution cap, also the fallback for unparseable overrides,
/// in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 600;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cloud REST endpoint (e.g., "https://cloud.example.com")
    pub cloud_url: String,

    /// Bearer token for the cloud API
    pub api_token: String,

    /// Publicly reachable base URL of this host; the default webhook
    /// callback address is derived from it
    pub public_url: String,

    /// Bind address for the callback listener
    pub hook_bind_addr: String,

    /// How often the polling strategy refreshes the remote run state.
    /// Internal tuning, not exposed through the front end.
    pub poll_interval: Duration,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(cloud_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            cloud_url: cloud_url.into(),
            api_token: api_token.into(),
            public_url: "http://localhost:8089".to_string(),
            hook_bind_addr: "0.0.0.0:8089".to_string(),
            poll_interval: Duration::from_secs(10),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - NIMBUS_CLOUD_URL (required)
    /// - NIMBUS_API_TOKEN (required)
    /// - NIMBUS_PUBLIC_URL (optional, default: http://localhost:8089)
    /// - NIMBUS_HOOK_BIND (optional, default: 0.0.0.0:8089)
    /// - NIMBUS_POLL_INTERVAL (optional, seconds, default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        let cloud_url = std::env::var("NIMBUS_CLOUD_URL")
            .map_err(|_| anyhow::anyhow!("NIMBUS_CLOUD_URL environment variable not set"))?;

        let api_token = std::env::var("NIMBUS_API_TOKEN")
            .map_err(|_| anyhow::anyhow!("NIMBUS_API_TOKEN environment variable not set"))?;

        let mut config = Self::new(cloud_url, api_token);

        if let Ok(public_url) = std::env::var("NIMBUS_PUBLIC_URL") {
            config.public_url = public_url;
        }
        if let Ok(bind) = std::env::var("NIMBUS_HOOK_BIND") {
            config.hook_bind_addr = bind;
        }
        if let Some(interval) = std::env::var("NIMBUS_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.poll_interval = Duration::from_secs(interval);
        }

        Ok(config)
    }

    /// The callback URL used when a wait policy leaves the hook URL blank.
    pub fn default_hook_url(&self) -> String {
        format!("{}{}", self.public_url.trim_end_matches('/'), HOOK_PATH)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!("api_token cannot be empty");
        }

        if !self.cloud_url.starts_with("http://") && !self.cloud_url.starts_with("https://") {
            anyhow::bail!("cloud_url must start with http:// or https://");
        }

        if !self.public_url.starts_with("http://") && !self.public_url.starts_with("https://") {
            anyhow::bail!("public_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }
}
