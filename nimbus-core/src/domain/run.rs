//! Run domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Remote-tracked lifecycle state of a test run.
///
/// Only `Finished` is usable for result retrieval; the other terminal
/// states mean the run produced nothing worth downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Queued,
    Running,
    Finished,
    Aborted,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted | Self::Failed)
    }
}

/// Execution policy over the devices of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    /// Run on every device of the group at once
    #[default]
    Parallel,
    /// One device after another
    Serial,
    /// Exactly one device of the group
    #[serde(rename = "single")]
    SingleDevice,
}

impl SchedulerMode {
    /// Wire name, as the cloud API spells it
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Serial => "serial",
            Self::SingleDevice => "single",
        }
    }
}

impl fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "serial" => Ok(Self::Serial),
            "single" | "single_device" | "single-device" => Ok(Self::SingleDevice),
            other => Err(format!("unknown scheduler mode: {other}")),
        }
    }
}

/// The pair that identifies a submitted run from submission onward.
///
/// Created by the submitter, consumed by the waiter, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    pub project_id: u64,
    pub run_id: u64,
}

impl RunHandle {
    pub fn new(project_id: u64, run_id: u64) -> Self {
        Self { project_id, run_id }
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.run_id)
    }
}

/// Remote run record as returned by the cloud API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: u64,
    pub project_id: u64,
    pub display_name: Option<String>,
    pub state: RunState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TestRun {
    pub fn handle(&self) -> RunHandle {
        RunHandle::new(self.project_id, self.id)
    }
}
