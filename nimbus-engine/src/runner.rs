//! End-to-end job execution
//!
//! `CloudRunner` owns the submission lock and the watch registry and
//! drives one job from request to reported outcome. Failures anywhere in
//! the pipeline are logged and folded into the returned report; only the
//! front end decides whether a failed report kills the build.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};

use nimbus_client::DeviceCloud;
use nimbus_core::domain::request::RunRequest;
use nimbus_core::domain::run::RunHandle;

use crate::config::EngineConfig;
use crate::lock::RunLock;
use crate::scheduler::{CompletionScheduler, WatchRegistry};
use crate::submit::{RunSubmitter, Submission};
use crate::waiter::{RunWaiter, WaitOutcome};

/// Final report for one job.
///
/// `success` is the AND of submission success and, when a wait policy was
/// present, completion with a good download.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub success: bool,
    pub handle: Option<RunHandle>,
    /// Link to the run in the cloud UI, exported as CLOUD_LINK downstream
    pub deep_link: Option<String>,
    pub outcome: Option<WaitOutcome>,
}

impl RunReport {
    fn failed() -> Self {
        Self {
            success: false,
            handle: None,
            deep_link: None,
            outcome: None,
        }
    }

    fn submitted(submission: &Submission, success: bool, outcome: Option<WaitOutcome>) -> Self {
        Self {
            success,
            handle: Some(submission.handle),
            deep_link: Some(submission.deep_link.clone()),
            outcome,
        }
    }
}

/// Top-level orchestrator, one per service instance.
///
/// All jobs executed through the same runner share its submission lock
/// and watch registry; the lock is what serializes their configure+submit
/// sections.
pub struct CloudRunner {
    cloud: Arc<dyn DeviceCloud>,
    config: EngineConfig,
    lock: RunLock,
    registry: Arc<WatchRegistry>,
}

impl CloudRunner {
    pub fn new(cloud: Arc<dyn DeviceCloud>, config: EngineConfig) -> Self {
        Self {
            cloud,
            config,
            lock: RunLock::new(),
            registry: Arc::new(WatchRegistry::new()),
        }
    }

    /// Registry backing the webhook endpoint; hand this to `hook::serve`.
    pub fn watch_registry(&self) -> Arc<WatchRegistry> {
        Arc::clone(&self.registry)
    }

    /// Submits the job and, when a wait policy is present, waits for the
    /// terminal state and fetches results. Never raises: every failure
    /// becomes a failed report.
    pub async fn execute(
        &self,
        request: &RunRequest,
        workdir: &Path,
        vars: &HashMap<String, String>,
        interrupt: Arc<Notify>,
    ) -> RunReport {
        info!("starting cloud test run");

        let submitter = RunSubmitter::new(
            Arc::clone(&self.cloud),
            self.lock.clone(),
            self.config.clone(),
        );
        let submission = match submitter.submit(request, vars).await {
            Ok(submission) => submission,
            Err(e) => {
                error!("submission failed: {}", e);
                info!("cloud test run failed");
                return RunReport::failed();
            }
        };
        info!("run submitted: {}", submission.deep_link);

        let Some(policy) = &request.wait else {
            info!("not waiting for results");
            info!("cloud test run succeeded");
            return RunReport::submitted(&submission, true, None);
        };

        let scheduler = CompletionScheduler::new(
            policy.strategy,
            Arc::clone(&self.cloud),
            Arc::clone(&self.registry),
            self.config.poll_interval,
        );
        let waiter = RunWaiter::new(Arc::clone(&self.cloud), scheduler);
        let results_dir = resolve_results_dir(policy.results_path.as_deref(), workdir);
        let outcome = waiter
            .wait(submission.handle, policy, &results_dir, interrupt)
            .await;

        let success = outcome.is_success();
        if success {
            info!("cloud test run succeeded");
        } else {
            info!("cloud test run failed");
        }
        RunReport::submitted(&submission, success, Some(outcome))
    }
}

/// Results land in the override path when one was given, otherwise in the
/// job working directory.
fn resolve_results_dir(override_path: Option<&str>, workdir: &Path) -> PathBuf {
    match override_path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => workdir.to_path_buf(),
    }
}
