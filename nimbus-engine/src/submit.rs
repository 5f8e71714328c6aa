//! Run submission
//!
//! Turns a validated request into a run handle. The configure+submit
//! sequence runs under the shared [`RunLock`] so two jobs targeting the
//! same remote project cannot interleave configuration writes; the lock
//! guard is dropped when `submit` returns, never held across a wait.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use nimbus_client::{ClientError, DeviceCloud};
use nimbus_core::domain::project::{ArtifactKind, RunParameter, TestRunConfig};
use nimbus_core::domain::request::{RequestError, RunRequest, WaitPolicy};
use nimbus_core::domain::run::RunHandle;
use nimbus_core::dto::run::{NotificationSettings, SubmitRunRequest};

use crate::config::{DEFAULT_TEST_TIMEOUT_SECS, EngineConfig};
use crate::expand::{expand, expand_opt};
use crate::lock::RunLock;

/// Why a submission produced no handle.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid run request: {0}")]
    Validation(#[from] RequestError),

    #[error("project {0} not found, check the project id")]
    ProjectNotFound(u64),

    #[error("cloud request failed: {0}")]
    Remote(#[from] ClientError),
}

/// Outcome of a successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub handle: RunHandle,
    /// Human-readable link to the run in the cloud UI
    pub deep_link: String,
}

pub struct RunSubmitter {
    cloud: Arc<dyn DeviceCloud>,
    lock: RunLock,
    config: EngineConfig,
}

impl RunSubmitter {
    pub fn new(cloud: Arc<dyn DeviceCloud>, lock: RunLock, config: EngineConfig) -> Self {
        Self {
            cloud,
            lock,
            config,
        }
    }

    /// Runs the verify, configure, upload and submit steps under the
    /// submission lock.
    ///
    /// An upload failure aborts before any run is created; every exit
    /// path releases the lock through the guard.
    pub async fn submit(
        &self,
        request: &RunRequest,
        vars: &HashMap<String, String>,
    ) -> Result<Submission, SubmitError> {
        let app_path = expand(&request.app_path, vars);
        let test_path = expand_opt(request.test_path.as_deref(), vars);
        let data_path = expand_opt(request.data_path.as_deref(), vars);
        let instrumentation_runner = expand_opt(request.instrumentation_runner.as_deref(), vars);
        let with_annotation = expand_opt(request.with_annotation.as_deref(), vars);
        let without_annotation = expand_opt(request.without_annotation.as_deref(), vars);

        let _guard = self.lock.acquire().await;

        request.validate()?;

        let user = self.cloud.me().await?;
        let project = match self.cloud.get_project(request.project_id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => {
                return Err(SubmitError::ProjectNotFound(request.project_id));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(email) = request
            .notification_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
        {
            self.cloud
                .update_notification_settings(&NotificationSettings {
                    email: email.to_string(),
                    kind: request.notification_email_kind,
                })
                .await?;
        }

        let timeout_secs =
            resolve_timeout(request.test_timeout.as_deref(), user.is_paid(Utc::now()));

        let config = TestRunConfig {
            project_id: project.id,
            app_crawler_run: !request.is_full_test(),
            device_language_code: request.language.clone(),
            scheduler: request.scheduler,
            used_device_group_id: request.device_group_id,
            hook_url: request.wait.as_ref().map(|policy| self.resolve_hook_url(policy)),
            screenshot_dir: request.screenshots_directory.clone(),
            instrumentation_runner,
            with_annotation,
            without_annotation,
            limitation: request.test_cases.clone(),
            timeout_secs,
            parameters: parse_key_value_pairs(request.key_value_pairs.as_deref()),
        };
        self.cloud.update_run_config(&config).await?;

        info!(
            "project '{}': scheduler={}, device group {}, timeout {}s",
            project.name, config.scheduler, config.used_device_group_id, config.timeout_secs
        );

        info!("uploading application {}", app_path);
        let app_file_id = self
            .cloud
            .upload_artifact(project.id, ArtifactKind::Application, Path::new(&app_path))
            .await?;

        let test_file_id = match test_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => {
                info!("uploading test package {}", path);
                Some(
                    self.cloud
                        .upload_artifact(project.id, ArtifactKind::Test, Path::new(path))
                        .await?,
                )
            }
            None => None,
        };

        let data_file_id = match data_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => {
                info!("uploading data file {}", path);
                Some(
                    self.cloud
                        .upload_artifact(project.id, ArtifactKind::Data, Path::new(path))
                        .await?,
                )
            }
            None => None,
        };

        info!("starting test run");
        let name = resolve_run_name(expand_opt(request.test_run_name.as_deref(), vars));
        let run = self
            .cloud
            .submit_run(
                project.id,
                &SubmitRunRequest {
                    name,
                    app_file_id,
                    test_file_id,
                    data_file_id,
                },
            )
            .await?;

        let handle = run.handle();
        let deep_link = format!(
            "{}/#service/testrun/{}/{}",
            self.config.cloud_url.trim_end_matches('/'),
            handle.project_id,
            handle.run_id
        );
        Ok(Submission { handle, deep_link })
    }

    fn resolve_hook_url(&self, policy: &WaitPolicy) -> String {
        match policy.hook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => self.config.default_hook_url(),
        }
    }
}

/// Paid accounts may override the per-run timeout; everyone else gets the
/// free-tier cap. Unparseable overrides fall back with a warning instead
/// of failing the job.
fn resolve_timeout(raw: Option<&str>, paid: bool) -> u64 {
    if !paid {
        return DEFAULT_TEST_TIMEOUT_SECS;
    }
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_TEST_TIMEOUT_SECS,
        Some(s) => s.parse().unwrap_or_else(|_| {
            warn!(
                "test timeout '{}' is not numeric, using {}s",
                s, DEFAULT_TEST_TIMEOUT_SECS
            );
            DEFAULT_TEST_TIMEOUT_SECS
        }),
    }
}

/// `k=v` pairs separated by commas or semicolons; malformed entries are
/// dropped.
fn parse_key_value_pairs(raw: Option<&str>) -> Vec<RunParameter> {
    raw.unwrap_or_default()
        .split([',', ';'])
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(RunParameter {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// A name that expanded to blank, or still starts with an unresolved `$`,
/// submits as unnamed.
fn resolve_run_name(name: Option<String>) -> Option<String> {
    name.filter(|name| {
        let name = name.trim();
        !name.is_empty() && !name.starts_with('$')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeCloud};
    use std::time::Duration;

    fn submitter(cloud: &FakeCloud) -> RunSubmitter {
        RunSubmitter::new(
            Arc::new(cloud.clone()),
            RunLock::new(),
            EngineConfig::new("https://cloud.example.com", "token"),
        )
    }

    fn no_vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn timeout_resolution() {
        assert_eq!(resolve_timeout(Some("1800"), true), 1800);
        // Free accounts are capped regardless of the override.
        assert_eq!(resolve_timeout(Some("1800"), false), DEFAULT_TEST_TIMEOUT_SECS);
        assert_eq!(resolve_timeout(None, true), DEFAULT_TEST_TIMEOUT_SECS);
        // Non-numeric override recovers with the default.
        assert_eq!(resolve_timeout(Some("soon"), true), DEFAULT_TEST_TIMEOUT_SECS);
    }

    #[test]
    fn key_value_pair_parsing() {
        let params = parse_key_value_pairs(Some("a=1, b = two ;c=;=skipped,malformed"));
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], RunParameter { key: "a".into(), value: "1".into() });
        assert_eq!(params[1], RunParameter { key: "b".into(), value: "two".into() });
        assert_eq!(params[2], RunParameter { key: "c".into(), value: "".into() });
        assert!(parse_key_value_pairs(None).is_empty());
    }

    #[test]
    fn run_name_resolution() {
        assert_eq!(resolve_run_name(Some("nightly".into())), Some("nightly".into()));
        assert_eq!(resolve_run_name(Some("  ".into())), None);
        assert_eq!(resolve_run_name(Some("$UNSET_NAME".into())), None);
        assert_eq!(resolve_run_name(None), None);
    }

    #[tokio::test]
    async fn full_submission_uploads_everything() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let mut request = RunRequest::new(144314736, 36085, "app.apk");
        request.test_path = Some("tests.zip".to_string());
        request.data_path = Some("fixtures.zip".to_string());

        let submission = submitter.submit(&request, &no_vars()).await.unwrap();
        assert_eq!(submission.handle.project_id, 144314736);
        assert!(
            submission
                .deep_link
                .starts_with("https://cloud.example.com/#service/testrun/144314736/")
        );

        let calls = cloud.calls();
        assert!(calls.contains(&Call::Upload(144314736, ArtifactKind::Application)));
        assert!(calls.contains(&Call::Upload(144314736, ArtifactKind::Test)));
        assert!(calls.contains(&Call::Upload(144314736, ArtifactKind::Data)));
        // Configuration lands strictly before submission.
        let config_pos = calls.iter().position(|c| matches!(c, Call::UpdateConfig(_))).unwrap();
        let submit_pos = calls.iter().position(|c| matches!(c, Call::SubmitRun(_))).unwrap();
        assert!(config_pos < submit_pos);

        // No test package means crawler mode; here we supplied one.
        assert!(!cloud.pushed_configs()[0].app_crawler_run);
    }

    #[tokio::test]
    async fn validation_failure_makes_no_remote_calls() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let request = RunRequest::new(0, 36085, "app.apk");
        let err = submitter.submit(&request, &no_vars()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_project_is_reported() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let request = RunRequest::new(404, 36085, "app.apk");
        let err = submitter.submit(&request, &no_vars()).await.unwrap_err();
        assert!(matches!(err, SubmitError::ProjectNotFound(404)));
    }

    #[tokio::test]
    async fn app_upload_failure_aborts_before_submission() {
        let cloud = FakeCloud::new().failing_upload(ArtifactKind::Application);
        let submitter = submitter(&cloud);

        let request = RunRequest::new(144314736, 36085, "app.apk");
        let err = submitter.submit(&request, &no_vars()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Remote(_)));
        assert!(!cloud.calls().iter().any(|c| matches!(c, Call::SubmitRun(_))));
    }

    #[tokio::test]
    async fn paths_are_expanded_before_upload() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let mut request = RunRequest::new(1, 2, "$WORKSPACE/app.apk");
        request.test_run_name = Some("build-$BUILD_NUMBER".to_string());
        let vars = HashMap::from([
            ("WORKSPACE".to_string(), "/builds/7".to_string()),
            ("BUILD_NUMBER".to_string(), "7".to_string()),
        ]);

        submitter.submit(&request, &vars).await.unwrap();
        // The fake records kinds, not paths; the expansion itself is
        // covered in expand.rs. Here we just confirm nothing choked.
        assert!(cloud.calls().contains(&Call::Upload(1, ArtifactKind::Application)));
    }

    #[tokio::test]
    async fn hook_url_default_and_override() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let mut request = RunRequest::new(1, 2, "app.apk");
        request.wait = Some(WaitPolicy::new(Duration::from_secs(60)));
        submitter.submit(&request, &no_vars()).await.unwrap();

        let mut overridden = RunRequest::new(1, 2, "app.apk");
        let mut policy = WaitPolicy::new(Duration::from_secs(60));
        policy.hook_url = Some("https://ci.example.com/notify".to_string());
        overridden.wait = Some(policy);
        submitter.submit(&overridden, &no_vars()).await.unwrap();

        let configs = cloud.pushed_configs();
        assert_eq!(
            configs[0].hook_url.as_deref(),
            Some("http://localhost:8089/api/cloud-webhook")
        );
        assert_eq!(
            configs[1].hook_url.as_deref(),
            Some("https://ci.example.com/notify")
        );
    }

    #[tokio::test]
    async fn fire_and_forget_pushes_no_hook_url() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let request = RunRequest::new(1, 2, "app.apk");
        submitter.submit(&request, &no_vars()).await.unwrap();
        assert!(cloud.pushed_configs()[0].hook_url.is_none());
    }

    #[tokio::test]
    async fn paid_account_timeout_reaches_the_config() {
        let cloud = FakeCloud::new().paid();
        let submitter = submitter(&cloud);

        let mut request = RunRequest::new(1, 2, "app.apk");
        request.test_timeout = Some("1800".to_string());
        submitter.submit(&request, &no_vars()).await.unwrap();
        assert_eq!(cloud.pushed_configs()[0].timeout_secs, 1800);

        let cloud = FakeCloud::new();
        let submitter = RunSubmitter::new(
            Arc::new(cloud.clone()),
            RunLock::new(),
            EngineConfig::new("https://cloud.example.com", "token"),
        );
        let mut request = RunRequest::new(1, 2, "app.apk");
        request.test_timeout = Some("1800".to_string());
        submitter.submit(&request, &no_vars()).await.unwrap();
        assert_eq!(cloud.pushed_configs()[0].timeout_secs, DEFAULT_TEST_TIMEOUT_SECS);
    }

    #[tokio::test]
    async fn notification_email_updates_side_table() {
        let cloud = FakeCloud::new();
        let submitter = submitter(&cloud);

        let mut request = RunRequest::new(1, 2, "app.apk");
        request.notification_email = Some("qa@example.com".to_string());
        submitter.submit(&request, &no_vars()).await.unwrap();
        assert!(cloud.calls().contains(&Call::UpdateNotifications));

        let cloud = FakeCloud::new();
        let submitter = RunSubmitter::new(
            Arc::new(cloud.clone()),
            RunLock::new(),
            EngineConfig::new("https://cloud.example.com", "token"),
        );
        let request = RunRequest::new(1, 2, "app.apk");
        submitter.submit(&request, &no_vars()).await.unwrap();
        assert!(!cloud.calls().contains(&Call::UpdateNotifications));
    }
}
