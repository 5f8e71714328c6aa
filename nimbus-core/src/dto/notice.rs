//! Webhook payloads

use serde::{Deserialize, Serialize};

use crate::domain::run::{RunHandle, RunState};

/// Completion notification the cloud delivers to the callback endpoint
/// when a run reaches a terminal state.
///
/// The reported state is advisory; the waiter re-fetches the
/// authoritative state before touching results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub project_id: u64,
    pub run_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
}

impl CompletionNotice {
    pub fn handle(&self) -> RunHandle {
        RunHandle::new(self.project_id, self.run_id)
    }
}
