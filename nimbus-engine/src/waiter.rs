//! Completion wait
//!
//! Drives a [`CompletionScheduler`] under the caller's timeout. The wait
//! is a timed receive on the watch's completion channel, raced against an
//! interrupt signal; there is exactly one timeout and no retry of the
//! wait itself. The completion signal only says "something changed", so
//! the authoritative run state is re-fetched before results are touched.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time;
use tracing::{error, info, warn};

use nimbus_client::DeviceCloud;
use nimbus_core::domain::request::WaitPolicy;
use nimbus_core::domain::run::{RunHandle, RunState};

use crate::scheduler::CompletionScheduler;

/// Terminal state of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The run finished; `results_ok` is false when the download failed
    /// (the remote run itself is unaffected by that).
    Completed { results_ok: bool },
    /// No terminal state within the wait window, or the signal arrived
    /// but the refreshed state was not FINISHED.
    TimedOut,
    /// The waiting task was interrupted.
    Interrupted,
}

impl WaitOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed { results_ok: true })
    }
}

enum WaitSignal {
    Fired,
    Lost,
    Elapsed,
    Interrupted,
}

pub struct RunWaiter {
    cloud: Arc<dyn DeviceCloud>,
    scheduler: CompletionScheduler,
}

impl RunWaiter {
    pub fn new(cloud: Arc<dyn DeviceCloud>, scheduler: CompletionScheduler) -> Self {
        Self { cloud, scheduler }
    }

    /// Blocks up to `policy.timeout` for the run to reach a terminal
    /// state, then settles: retrieval on FINISHED, best-effort forced
    /// abort on a broken wait when the policy asks for it. The watch is
    /// always cancelled before returning, no matter which path ran.
    pub async fn wait(
        &self,
        handle: RunHandle,
        policy: &WaitPolicy,
        results_dir: &Path,
        interrupt: Arc<Notify>,
    ) -> WaitOutcome {
        let receiver = self.scheduler.schedule(handle).await;
        info!(
            "waiting up to {}s for run {} to finish",
            policy.timeout.as_secs(),
            handle
        );

        let signal = tokio::select! {
            received = time::timeout(policy.timeout, receiver) => match received {
                Ok(Ok(())) => WaitSignal::Fired,
                Ok(Err(_)) => WaitSignal::Lost,
                Err(_) => WaitSignal::Elapsed,
            },
            _ = interrupt.notified() => WaitSignal::Interrupted,
        };

        let outcome = match signal {
            WaitSignal::Fired => {
                self.scheduler.cancel(handle).await;
                self.settle(handle, policy, results_dir).await
            }
            WaitSignal::Lost => {
                warn!("completion watch for run {} vanished before signalling", handle);
                WaitOutcome::TimedOut
            }
            WaitSignal::Elapsed => {
                warn!(
                    "run {} did not finish within {}s",
                    handle,
                    policy.timeout.as_secs()
                );
                WaitOutcome::TimedOut
            }
            WaitSignal::Interrupted => {
                warn!("wait for run {} interrupted", handle);
                WaitOutcome::Interrupted
            }
        };

        if !matches!(outcome, WaitOutcome::Completed { .. }) && policy.force_abort_on_break {
            info!("force finishing run {} in the cloud", handle);
            if let Err(e) = self.cloud.abort_run(handle).await {
                warn!("failed to abort run {}: {}", handle, e);
            }
        }

        // Guaranteed cleanup; a no-op when already cancelled above.
        self.scheduler.cancel(handle).await;
        outcome
    }

    async fn settle(&self, handle: RunHandle, policy: &WaitPolicy, results_dir: &Path) -> WaitOutcome {
        let run = match self.cloud.get_run(handle).await {
            Ok(run) => run,
            Err(e) => {
                warn!("failed to refresh run {}: {}", handle, e);
                return WaitOutcome::TimedOut;
            }
        };

        if run.state != RunState::Finished {
            warn!(
                "run {} signalled completion but is {:?}, not finished",
                handle, run.state
            );
            return WaitOutcome::TimedOut;
        }

        info!(
            "run {} finished, downloading results to {}",
            handle,
            results_dir.display()
        );
        match self
            .cloud
            .download_results(handle, results_dir, policy.download_screenshots)
            .await
        {
            Ok(()) => WaitOutcome::Completed { results_ok: true },
            Err(e) => {
                error!("result download for run {} failed: {}", handle, e);
                WaitOutcome::Completed { results_ok: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeCloud;
    use crate::scheduler::WatchRegistry;
    use nimbus_core::domain::request::DetectionStrategy;
    use std::time::Duration;

    const HANDLE: RunHandle = RunHandle {
        project_id: 144314736,
        run_id: 36085,
    };

    fn waiter(cloud: &FakeCloud, strategy: DetectionStrategy) -> RunWaiter {
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = CompletionScheduler::new(
            strategy,
            Arc::new(cloud.clone()),
            registry,
            Duration::from_secs(2),
        );
        RunWaiter::new(Arc::new(cloud.clone()), scheduler)
    }

    fn policy(timeout_secs: u64, force_abort: bool) -> WaitPolicy {
        let mut policy = WaitPolicy::new(Duration::from_secs(timeout_secs));
        policy.strategy = DetectionStrategy::ActivePoll;
        policy.force_abort_on_break = force_abort;
        policy
    }

    #[tokio::test(start_paused = true)]
    async fn poll_completion_downloads_results() {
        // Running on the first refresh, finished on the second (t=2s),
        // well within the 5s window.
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running, RunState::Finished]);
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);

        let outcome = waiter
            .wait(HANDLE, &policy(5, false), Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        assert_eq!(outcome, WaitOutcome::Completed { results_ok: true });
        assert_eq!(cloud.download_count(), 1);
        assert_eq!(cloud.abort_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_force_abort() {
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running]);
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);

        let outcome = waiter
            .wait(HANDLE, &policy(1, false), Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(cloud.download_count(), 0);
        assert_eq!(cloud.abort_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_force_abort_aborts_exactly_once() {
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running]);
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);

        let outcome = waiter
            .wait(HANDLE, &policy(1, true), Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(cloud.abort_count(), 1);
        assert_eq!(cloud.download_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_without_finished_state_skips_retrieval() {
        // The poll sees ABORTED (terminal, so it signals), and the
        // settle refresh sees the same: no download may happen.
        let cloud = FakeCloud::new().with_run_states(&[RunState::Aborted]);
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);

        let outcome = waiter
            .wait(HANDLE, &policy(5, false), Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(cloud.download_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_degrades_outcome() {
        let cloud = FakeCloud::new()
            .with_run_states(&[RunState::Finished])
            .failing_download();
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);

        let outcome = waiter
            .wait(HANDLE, &policy(5, false), Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        assert_eq!(outcome, WaitOutcome::Completed { results_ok: false });
        assert!(!outcome.is_success());
        // The failed download does not trigger an abort.
        assert_eq!(cloud.abort_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_breaks_the_wait() {
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running]);
        let waiter = waiter(&cloud, DetectionStrategy::ActivePoll);
        let interrupt = Arc::new(Notify::new());

        // Permit stored before the wait starts; the select sees it
        // immediately.
        interrupt.notify_one();
        let outcome = waiter
            .wait(HANDLE, &policy(60, true), Path::new("/tmp/results"), interrupt)
            .await;

        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert_eq!(cloud.abort_count(), 1);
        assert_eq!(cloud.download_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_strategy_never_polls() {
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running]);
        let waiter = waiter(&cloud, DetectionStrategy::WebhookCallback);

        let mut policy = WaitPolicy::new(Duration::from_secs(1));
        policy.strategy = DetectionStrategy::WebhookCallback;
        let outcome = waiter
            .wait(HANDLE, &policy, Path::new("/tmp/results"), Arc::new(Notify::new()))
            .await;

        // Nothing ever signals, so the timeout is the only exit; no
        // state refresh happened along the way.
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(cloud.run_state_refreshes(), 0);
    }
}
