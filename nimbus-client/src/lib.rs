//! Nimbus HTTP Client
//!
//! A typed HTTP client for the device-cloud REST API.
//!
//! This crate provides the concrete client plus the [`DeviceCloud`] trait
//! the orchestration engine is written against, so the engine never
//! depends on a live endpoint.
//!
//! # Example
//!
//! ```no_run
//! use nimbus_client::CloudClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nimbus_client::ClientError> {
//!     let client = CloudClient::new("https://cloud.example.com", "token");
//!
//!     let project = client.get_project(144314736).await?;
//!     println!("project: {}", project.name);
//!     Ok(())
//! }
//! ```

pub mod cloud;
pub mod error;

mod artifacts;
mod projects;
mod runs;

// Re-export commonly used types
pub use cloud::DeviceCloud;
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the device-cloud API
///
/// Methods are organized into logical groups:
/// - Projects and account (`get_project`, `me`, config updates)
/// - Run lifecycle (`submit_run`, `get_run`, `abort_run`)
/// - Artifact transport (uploads, result downloads)
#[derive(Debug, Clone)]
pub struct CloudClient {
    /// Base URL of the cloud (e.g., "https://cloud.example.com")
    base_url: String,
    /// Bearer token sent with every request
    api_token: String,
    /// HTTP client instance
    http: Client,
}

impl CloudClient {
    /// Create a new cloud client
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            http: Client::new(),
        }
    }

    /// Create a new cloud client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_http_client(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        http: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            http,
        }
    }

    /// Get the base URL of the cloud
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(&self.api_token)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.post(url).bearer_auth(&self.api_token)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Checks the status code and returns an appropriate error if the
    /// request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CloudClient::new("https://cloud.example.com", "token");
        assert_eq!(client.base_url(), "https://cloud.example.com");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CloudClient::new("https://cloud.example.com/", "token");
        assert_eq!(client.base_url(), "https://cloud.example.com");
    }

    #[test]
    fn test_client_with_custom_http_client() {
        let http = Client::new();
        let client = CloudClient::with_http_client("https://cloud.example.com", "token", http);
        assert_eq!(client.base_url(), "https://cloud.example.com");
    }
}
