//! Project and account domain types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::TestCaseSelection;
use super::run::SchedulerMode;

/// A remote project owning test-run configuration, artifacts and runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

/// Named pool of devices a run may be scheduled against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub id: u64,
    pub display_name: String,
    pub device_count: u32,
}

/// The authenticated cloud account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: u64,
    pub email: Option<String>,
    pub roles: Vec<AccountRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRole {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiUser {
    /// Roles that lift the free-tier execution time cap.
    pub const PAID_ROLES: [&'static str; 4] =
        ["PRIORITY_SILVER", "PRIORITY_GOLD", "PRIORITY_PLATINUM", "PAID_RUN"];

    /// Whether the account holds an unexpired paid role at `now`.
    pub fn is_paid(&self, now: DateTime<Utc>) -> bool {
        self.roles.iter().any(|role| {
            Self::PAID_ROLES.contains(&role.name.as_str())
                && role.expires_at.is_none_or(|expires| expires > now)
        })
    }
}

/// Kind tag for uploaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Application,
    Test,
    Data,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Test => "test",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the cloud should mail run outcomes to the notification address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEmailKind {
    #[default]
    Always,
    OnFailure,
}

impl FromStr for NotificationEmailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on_failure" | "on-failure" => Ok(Self::OnFailure),
            other => Err(format!("unknown notification email type: {other}")),
        }
    }
}

/// Free-form key/value forwarded to the test run environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameter {
    pub key: String,
    pub value: String,
}

/// Fully resolved test-run configuration pushed to the remote project
/// before submission.
///
/// Updates are idempotent, last writer wins; the submission lock is what
/// keeps a concurrent job's write from landing between this job's update
/// and its run submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunConfig {
    pub project_id: u64,
    /// Exploratory crawler run; true iff no test package was supplied
    pub app_crawler_run: bool,
    pub device_language_code: String,
    pub scheduler: SchedulerMode,
    pub used_device_group_id: u64,
    pub hook_url: Option<String>,
    pub screenshot_dir: Option<String>,
    pub instrumentation_runner: Option<String>,
    pub with_annotation: Option<String>,
    pub without_annotation: Option<String>,
    pub limitation: Option<TestCaseSelection>,
    pub timeout_secs: u64,
    pub parameters: Vec<RunParameter>,
}
