//! Scripted `DeviceCloud` used by engine tests
//!
//! Records every call in order and plays back configured behavior:
//! a sequence of run states for successive refreshes (the last entry
//! repeats), per-kind upload failures, download failures, and an
//! artificial delay inside the configure/submit steps to widen the race
//! window in interleaving tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use nimbus_client::{ClientError, DeviceCloud, Result};
use nimbus_core::domain::project::{ApiUser, AccountRole, ArtifactKind, Project, TestRunConfig};
use nimbus_core::domain::run::{RunHandle, RunState, TestRun};
use nimbus_core::dto::run::{NotificationSettings, SubmitRunRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Me,
    GetProject(u64),
    UpdateConfig(u64),
    UpdateNotifications,
    SubmitRun(u64),
    GetRun(RunHandle),
    AbortRun(RunHandle),
    Upload(u64, ArtifactKind),
    Download(RunHandle),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    run_states: VecDeque<RunState>,
    configs: Vec<TestRunConfig>,
    paid: bool,
    fail_upload: Option<ArtifactKind>,
    fail_download: bool,
    step_delay: Option<Duration>,
    next_file_id: u64,
    next_run_id: u64,
}

#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.next_file_id = 100;
            state.next_run_id = 9000;
        }
        fake
    }

    /// Successive `get_run` results; the last entry repeats forever.
    pub fn with_run_states(self, states: &[RunState]) -> Self {
        self.state.lock().unwrap().run_states = states.iter().copied().collect();
        self
    }

    pub fn paid(self) -> Self {
        self.state.lock().unwrap().paid = true;
        self
    }

    pub fn with_step_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().step_delay = Some(delay);
        self
    }

    pub fn failing_upload(self, kind: ArtifactKind) -> Self {
        self.state.lock().unwrap().fail_upload = Some(kind);
        self
    }

    pub fn set_fail_upload(&self, kind: Option<ArtifactKind>) {
        self.state.lock().unwrap().fail_upload = kind;
    }

    pub fn failing_download(self) -> Self {
        self.state.lock().unwrap().fail_download = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn pushed_configs(&self) -> Vec<TestRunConfig> {
        self.state.lock().unwrap().configs.clone()
    }

    pub fn run_state_refreshes(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::GetRun(_)))
            .count()
    }

    pub fn abort_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::AbortRun(_)))
            .count()
    }

    pub fn download_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Download(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn step_delay(&self) -> Option<Duration> {
        self.state.lock().unwrap().step_delay
    }
}

#[async_trait]
impl DeviceCloud for FakeCloud {
    async fn me(&self) -> Result<ApiUser> {
        self.record(Call::Me);
        let paid = self.state.lock().unwrap().paid;
        let roles = if paid {
            vec![AccountRole {
                name: "PAID_RUN".to_string(),
                expires_at: None,
            }]
        } else {
            vec![]
        };
        Ok(ApiUser {
            id: 1,
            email: None,
            roles,
        })
    }

    async fn get_project(&self, id: u64) -> Result<Project> {
        self.record(Call::GetProject(id));
        if id == 404 {
            return Err(ClientError::NotFound(format!("project {id}")));
        }
        Ok(Project {
            id,
            name: format!("project-{id}"),
        })
    }

    async fn update_run_config(&self, config: &TestRunConfig) -> Result<()> {
        self.record(Call::UpdateConfig(config.project_id));
        self.state.lock().unwrap().configs.push(config.clone());
        if let Some(delay) = self.step_delay() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn update_notification_settings(&self, _settings: &NotificationSettings) -> Result<()> {
        self.record(Call::UpdateNotifications);
        Ok(())
    }

    async fn submit_run(&self, project_id: u64, request: &SubmitRunRequest) -> Result<TestRun> {
        self.record(Call::SubmitRun(project_id));
        if let Some(delay) = self.step_delay() {
            tokio::time::sleep(delay).await;
        }
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_run_id += 1;
            state.next_run_id
        };
        Ok(TestRun {
            id,
            project_id,
            display_name: request.name.clone(),
            state: RunState::Queued,
            created_at: Utc::now(),
        })
    }

    async fn get_run(&self, handle: RunHandle) -> Result<TestRun> {
        self.record(Call::GetRun(handle));
        let state = {
            let mut state = self.state.lock().unwrap();
            if state.run_states.len() > 1 {
                state.run_states.pop_front().unwrap()
            } else {
                state.run_states.front().copied().unwrap_or(RunState::Finished)
            }
        };
        Ok(TestRun {
            id: handle.run_id,
            project_id: handle.project_id,
            display_name: None,
            state,
            created_at: Utc::now(),
        })
    }

    async fn abort_run(&self, handle: RunHandle) -> Result<()> {
        self.record(Call::AbortRun(handle));
        Ok(())
    }

    async fn upload_artifact(
        &self,
        project_id: u64,
        kind: ArtifactKind,
        _path: &Path,
    ) -> Result<u64> {
        self.record(Call::Upload(project_id, kind));
        let (failing, id) = {
            let mut state = self.state.lock().unwrap();
            state.next_file_id += 1;
            (state.fail_upload == Some(kind), state.next_file_id)
        };
        if failing {
            return Err(ClientError::api_error(500, format!("{kind} upload refused")));
        }
        Ok(id)
    }

    async fn download_results(
        &self,
        handle: RunHandle,
        _dest_dir: &Path,
        _with_screenshots: bool,
    ) -> Result<()> {
        self.record(Call::Download(handle));
        if self.state.lock().unwrap().fail_download {
            return Err(ClientError::api_error(500, "results unavailable"));
        }
        Ok(())
    }
}
