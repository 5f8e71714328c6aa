//! Run lifecycle endpoints

use nimbus_core::domain::run::{RunHandle, TestRun};
use nimbus_core::dto::run::SubmitRunRequest;

use crate::CloudClient;
use crate::error::Result;

impl CloudClient {
    /// Submit a run against the project's current configuration
    ///
    /// # Arguments
    /// * `project_id` - The project to run under
    /// * `request` - Run name and uploaded artifact identifiers
    ///
    /// # Returns
    /// The created run record; its id plus the project id form the
    /// [`RunHandle`] used for every later operation.
    pub async fn submit_run(&self, project_id: u64, request: &SubmitRunRequest) -> Result<TestRun> {
        let url = format!("{}/api/v2/projects/{}/runs", self.base_url, project_id);
        let response = self.post(&url).json(request).send().await?;

        self.handle_response(response).await
    }

    /// Refresh the authoritative state of a run
    pub async fn get_run(&self, handle: RunHandle) -> Result<TestRun> {
        let url = format!(
            "{}/api/v2/projects/{}/runs/{}",
            self.base_url, handle.project_id, handle.run_id
        );
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a run that has not finished
    pub async fn abort_run(&self, handle: RunHandle) -> Result<()> {
        let url = format!(
            "{}/api/v2/projects/{}/runs/{}/abort",
            self.base_url, handle.project_id, handle.run_id
        );
        let response = self.post(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
