//! Project and account endpoints

use nimbus_core::domain::project::{ApiUser, DeviceGroup, Project, TestRunConfig};
use nimbus_core::dto::run::NotificationSettings;

use crate::CloudClient;
use crate::error::Result;

impl CloudClient {
    /// Fetch the authenticated account, including its roles
    pub async fn me(&self) -> Result<ApiUser> {
        let url = format!("{}/api/v2/me", self.base_url);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all projects visible to the account
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let url = format!("{}/api/v2/projects", self.base_url);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a project by ID
    pub async fn get_project(&self, id: u64) -> Result<Project> {
        let url = format!("{}/api/v2/projects/{}", self.base_url, id);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List device groups available to the account
    pub async fn list_device_groups(&self) -> Result<Vec<DeviceGroup>> {
        let url = format!("{}/api/v2/device-groups", self.base_url);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Push the resolved test-run configuration to the project
    ///
    /// The update is idempotent; the last writer wins.
    pub async fn update_run_config(&self, config: &TestRunConfig) -> Result<()> {
        let url = format!(
            "{}/api/v2/projects/{}/config",
            self.base_url, config.project_id
        );
        let response = self.post(&url).json(config).send().await?;

        self.handle_empty_response(response).await
    }

    /// Update the account's email notification side table
    pub async fn update_notification_settings(
        &self,
        settings: &NotificationSettings,
    ) -> Result<()> {
        let url = format!("{}/api/v2/me/notifications", self.base_url);
        let response = self.post(&url).json(settings).send().await?;

        self.handle_empty_response(response).await
    }
}
