//! Completion detection
//!
//! Watches a submitted run until it reaches a terminal state. Two
//! interchangeable strategies satisfy the same schedule/cancel contract:
//! active polling against the cloud API, and a passive webhook callback
//! delivered to the endpoint in [`crate::hook`]. The choice is data on
//! the wait policy, not a type hierarchy, so the waiter stays
//! strategy-agnostic.
//!
//! Every watch owns a single-slot completion channel. The polling task
//! and the webhook endpoint both signal through [`WatchRegistry::complete`],
//! which fires the slot at most once; duplicate or late signals, and
//! signals racing a cancel, are all no-ops.

mod poll;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use nimbus_client::DeviceCloud;
use nimbus_core::domain::request::DetectionStrategy;
use nimbus_core::domain::run::RunHandle;

/// One registered watch: the completion slot plus, for polling watches,
/// the background refresh task.
struct Watch {
    slot: Option<oneshot::Sender<()>>,
    poller: Option<JoinHandle<()>>,
}

/// Shared table of active watches, keyed by run handle.
///
/// At most one watch is active per handle; scheduling again replaces the
/// previous watch.
#[derive(Default)]
pub struct WatchRegistry {
    watches: Mutex<HashMap<RunHandle, Watch>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the completion slot for `handle`, if a live watch exists.
    ///
    /// Returns whether a signal was actually delivered. Unknown handles
    /// and already-signalled watches are ignored, so duplicate or late
    /// notifications are harmless.
    pub async fn complete(&self, handle: RunHandle) -> bool {
        let mut watches = self.watches.lock().await;
        match watches.get_mut(&handle).and_then(|watch| watch.slot.take()) {
            Some(slot) => slot.send(()).is_ok(),
            None => false,
        }
    }

    async fn insert(&self, handle: RunHandle, watch: Watch) {
        let mut watches = self.watches.lock().await;
        if let Some(previous) = watches.insert(handle, watch) {
            if let Some(task) = previous.poller {
                task.abort();
            }
        }
    }

    /// Attach the polling task to an already-inserted watch. The watch is
    /// inserted first so a fast poller cannot signal before its slot
    /// exists; if the watch was cancelled in between, the task dies here.
    async fn attach_poller(&self, handle: RunHandle, task: JoinHandle<()>) {
        let mut watches = self.watches.lock().await;
        match watches.get_mut(&handle) {
            Some(watch) => watch.poller = Some(task),
            None => task.abort(),
        }
    }

    async fn remove(&self, handle: RunHandle) -> bool {
        let removed = self.watches.lock().await.remove(&handle);
        match removed {
            Some(watch) => {
                if let Some(task) = watch.poller {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_watching(&self, handle: RunHandle) -> bool {
        self.watches.lock().await.contains_key(&handle)
    }
}

/// Strategy-tagged completion scheduler.
pub struct CompletionScheduler {
    strategy: DetectionStrategy,
    cloud: Arc<dyn DeviceCloud>,
    registry: Arc<WatchRegistry>,
    poll_interval: Duration,
}

impl CompletionScheduler {
    pub fn new(
        strategy: DetectionStrategy,
        cloud: Arc<dyn DeviceCloud>,
        registry: Arc<WatchRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            strategy,
            cloud,
            registry,
            poll_interval,
        }
    }

    /// Begins watching `handle` and returns the completion slot's
    /// receiving half immediately. Replaces any previous watch for the
    /// same handle.
    pub async fn schedule(&self, handle: RunHandle) -> oneshot::Receiver<()> {
        let (slot, receiver) = oneshot::channel();
        self.registry
            .insert(
                handle,
                Watch {
                    slot: Some(slot),
                    poller: None,
                },
            )
            .await;

        match self.strategy {
            DetectionStrategy::ActivePoll => {
                let task = poll::spawn(
                    Arc::clone(&self.cloud),
                    Arc::clone(&self.registry),
                    handle,
                    self.poll_interval,
                );
                self.registry.attach_poller(handle, task).await;
                debug!("scheduled polling watch for run {}", handle);
            }
            DetectionStrategy::WebhookCallback => {
                debug!("registered webhook watch for run {}", handle);
            }
        }

        receiver
    }

    /// Stops watching `handle`. Idempotent: safe to call any number of
    /// times, whether or not the watch fired or ever existed.
    pub async fn cancel(&self, handle: RunHandle) -> bool {
        let removed = self.registry.remove(handle).await;
        if removed {
            debug!("cancelled watch for run {}", handle);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeCloud;
    use nimbus_core::domain::run::RunState;

    fn webhook_scheduler(cloud: &FakeCloud, registry: &Arc<WatchRegistry>) -> CompletionScheduler {
        CompletionScheduler::new(
            DetectionStrategy::WebhookCallback,
            Arc::new(cloud.clone()),
            Arc::clone(registry),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn webhook_watch_fires_once() {
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = webhook_scheduler(&FakeCloud::new(), &registry);
        let handle = RunHandle::new(1, 10);

        let receiver = scheduler.schedule(handle).await;
        assert!(registry.complete(handle).await);
        // Duplicate delivery finds the slot already consumed.
        assert!(!registry.complete(handle).await);

        receiver.await.unwrap();
    }

    #[tokio::test]
    async fn late_notice_after_cancel_is_noop() {
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = webhook_scheduler(&FakeCloud::new(), &registry);
        let handle = RunHandle::new(1, 11);

        let _receiver = scheduler.schedule(handle).await;
        assert!(scheduler.cancel(handle).await);
        assert!(!registry.complete(handle).await);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = webhook_scheduler(&FakeCloud::new(), &registry);
        let handle = RunHandle::new(1, 12);

        // Never scheduled: nothing to remove.
        assert!(!scheduler.cancel(handle).await);

        let _receiver = scheduler.schedule(handle).await;
        assert!(scheduler.cancel(handle).await);
        assert!(!scheduler.cancel(handle).await);
        assert!(!scheduler.cancel(handle).await);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_watch() {
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = webhook_scheduler(&FakeCloud::new(), &registry);
        let handle = RunHandle::new(1, 13);

        let first = scheduler.schedule(handle).await;
        let second = scheduler.schedule(handle).await;

        // The first slot died with the replaced watch.
        assert!(first.await.is_err());
        assert!(registry.complete(handle).await);
        second.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_watch_signals_on_terminal_state() {
        let cloud = FakeCloud::new().with_run_states(&[RunState::Running, RunState::Finished]);
        let registry = Arc::new(WatchRegistry::new());
        let scheduler = CompletionScheduler::new(
            DetectionStrategy::ActivePoll,
            Arc::new(cloud.clone()),
            Arc::clone(&registry),
            Duration::from_secs(2),
        );
        let handle = RunHandle::new(1, 14);

        let receiver = scheduler.schedule(handle).await;
        receiver.await.unwrap();

        // First refresh saw RUNNING, second saw FINISHED.
        assert_eq!(cloud.run_state_refreshes(), 2);
        assert!(scheduler.cancel(handle).await);
    }
}
