//! Job request types
//!
//! `RunRequest` is the immutable description of one cloud job, built once
//! by the front end and handed to the engine. Whether the caller wants to
//! wait for results is expressed by the presence of a `WaitPolicy`, not by
//! a defaulted field: an absent policy is fire-and-forget, full stop.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::project::NotificationEmailKind;
use super::run::SchedulerMode;

/// Device language used when the caller does not pick one.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Reasons a request may never reach the submitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("application path is required")]
    MissingAppPath,
    #[error("project id is required")]
    MissingProject,
    #[error("device group id is required")]
    MissingDeviceGroup,
    #[error("wait timeout must be positive when waiting for results")]
    NonPositiveWaitTimeout,
}

/// How completion of a run is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStrategy {
    /// Periodically refresh the run state over the API
    ActivePoll,
    /// Rely on the cloud calling back when the run finishes
    #[default]
    WebhookCallback,
}

impl FromStr for DetectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "poll" | "api_call" | "api-call" => Ok(Self::ActivePoll),
            "webhook" | "hook_url" | "hook-url" => Ok(Self::WebhookCallback),
            other => Err(format!("unknown wait method: {other}")),
        }
    }
}

/// Dimension a test-case limitation selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestCaseSelector {
    Package,
    Class,
}

impl FromStr for TestCaseSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "package" => Ok(Self::Package),
            "class" => Ok(Self::Class),
            other => Err(format!("unknown test case selector: {other}")),
        }
    }
}

/// Restricts the run to a subset of test cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseSelection {
    pub selector: TestCaseSelector,
    pub value: String,
}

/// Synchronous-completion parameters, present only when the caller asked
/// to wait.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub strategy: DetectionStrategy,
    /// Callback URL override; blank means the self-hosted endpoint
    pub hook_url: Option<String>,
    /// Results destination override; blank means the job working directory
    pub results_path: Option<String>,
    pub timeout: Duration,
    pub download_screenshots: bool,
    /// Abort the remote run when the wait breaks without a terminal state
    pub force_abort_on_break: bool,
}

impl WaitPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            strategy: DetectionStrategy::default(),
            hook_url: None,
            results_path: None,
            timeout,
            download_screenshots: false,
            force_abort_on_break: false,
        }
    }
}

/// Immutable description of one job to submit.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project_id: u64,
    pub device_group_id: u64,
    pub app_path: String,
    /// Absent means app-crawler (exploratory) mode rather than a scripted run
    pub test_path: Option<String>,
    pub data_path: Option<String>,
    pub test_run_name: Option<String>,
    pub instrumentation_runner: Option<String>,
    pub with_annotation: Option<String>,
    pub without_annotation: Option<String>,
    pub test_cases: Option<TestCaseSelection>,
    /// Comma/semicolon separated `k=v` pairs forwarded to the run
    pub key_value_pairs: Option<String>,
    pub screenshots_directory: Option<String>,
    pub notification_email: Option<String>,
    pub notification_email_kind: NotificationEmailKind,
    pub scheduler: SchedulerMode,
    pub language: String,
    /// Raw per-run timeout override in seconds; parsed at submit time and
    /// only honored for paid accounts
    pub test_timeout: Option<String>,
    /// Escalate a failed outcome into a pipeline-fatal failure
    pub fail_fast: bool,
    pub wait: Option<WaitPolicy>,
}

impl RunRequest {
    pub fn new(project_id: u64, device_group_id: u64, app_path: impl Into<String>) -> Self {
        Self {
            project_id,
            device_group_id,
            app_path: app_path.into(),
            test_path: None,
            data_path: None,
            test_run_name: None,
            instrumentation_runner: None,
            with_annotation: None,
            without_annotation: None,
            test_cases: None,
            key_value_pairs: None,
            screenshots_directory: None,
            notification_email: None,
            notification_email_kind: NotificationEmailKind::default(),
            scheduler: SchedulerMode::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            test_timeout: None,
            fail_fast: false,
            wait: None,
        }
    }

    /// Scripted test run, as opposed to an exploratory crawler run.
    pub fn is_full_test(&self) -> bool {
        self.test_path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn has_data_file(&self) -> bool {
        self.data_path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.app_path.trim().is_empty() {
            return Err(RequestError::MissingAppPath);
        }
        if self.project_id == 0 {
            return Err(RequestError::MissingProject);
        }
        if self.device_group_id == 0 {
            return Err(RequestError::MissingDeviceGroup);
        }
        if let Some(wait) = &self.wait {
            if wait.timeout.is_zero() {
                return Err(RequestError::NonPositiveWaitTimeout);
            }
        }
        Ok(())
    }
}
