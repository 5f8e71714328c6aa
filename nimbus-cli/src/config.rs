//! Configuration module
//!
//! Handles CLI configuration including cloud endpoint and credentials.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the device cloud
    pub cloud_url: String,
    /// Bearer token for the cloud API
    pub api_token: String,
}
