//! Abstract device-cloud surface
//!
//! The orchestration engine talks to the cloud exclusively through this
//! trait, so tests can substitute a scripted implementation and the
//! engine never needs a live endpoint.

use std::path::Path;

use async_trait::async_trait;

use nimbus_core::domain::project::{ApiUser, ArtifactKind, Project, TestRunConfig};
use nimbus_core::domain::run::{RunHandle, TestRun};
use nimbus_core::dto::run::{NotificationSettings, SubmitRunRequest};

use crate::CloudClient;
use crate::error::Result;

/// Remote API surface the engine is written against.
#[async_trait]
pub trait DeviceCloud: Send + Sync {
    /// The authenticated account, including its roles
    async fn me(&self) -> Result<ApiUser>;

    /// Resolve a project by id
    async fn get_project(&self, id: u64) -> Result<Project>;

    /// Push the resolved run configuration; idempotent, last writer wins
    async fn update_run_config(&self, config: &TestRunConfig) -> Result<()>;

    /// Email notification side-table update
    async fn update_notification_settings(&self, settings: &NotificationSettings) -> Result<()>;

    /// Submit a run against the previously pushed configuration
    async fn submit_run(&self, project_id: u64, request: &SubmitRunRequest) -> Result<TestRun>;

    /// Refresh the authoritative state of a run
    async fn get_run(&self, handle: RunHandle) -> Result<TestRun>;

    /// Best-effort cancellation of a run that has not finished
    async fn abort_run(&self, handle: RunHandle) -> Result<()>;

    /// Upload a local file, returning its artifact id
    async fn upload_artifact(&self, project_id: u64, kind: ArtifactKind, path: &Path)
    -> Result<u64>;

    /// Fetch the result bundle of a finished run into `dest_dir`
    async fn download_results(
        &self,
        handle: RunHandle,
        dest_dir: &Path,
        with_screenshots: bool,
    ) -> Result<()>;
}

#[async_trait]
impl DeviceCloud for CloudClient {
    async fn me(&self) -> Result<ApiUser> {
        CloudClient::me(self).await
    }

    async fn get_project(&self, id: u64) -> Result<Project> {
        CloudClient::get_project(self, id).await
    }

    async fn update_run_config(&self, config: &TestRunConfig) -> Result<()> {
        CloudClient::update_run_config(self, config).await
    }

    async fn update_notification_settings(&self, settings: &NotificationSettings) -> Result<()> {
        CloudClient::update_notification_settings(self, settings).await
    }

    async fn submit_run(&self, project_id: u64, request: &SubmitRunRequest) -> Result<TestRun> {
        CloudClient::submit_run(self, project_id, request).await
    }

    async fn get_run(&self, handle: RunHandle) -> Result<TestRun> {
        CloudClient::get_run(self, handle).await
    }

    async fn abort_run(&self, handle: RunHandle) -> Result<()> {
        CloudClient::abort_run(self, handle).await
    }

    async fn upload_artifact(
        &self,
        project_id: u64,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<u64> {
        CloudClient::upload_artifact(self, project_id, kind, path).await
    }

    async fn download_results(
        &self,
        handle: RunHandle,
        dest_dir: &Path,
        with_screenshots: bool,
    ) -> Result<()> {
        CloudClient::download_results(self, handle, dest_dir, with_screenshots).await
    }
}
