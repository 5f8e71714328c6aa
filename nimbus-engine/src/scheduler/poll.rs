//! Active polling strategy
//!
//! A background task periodically refreshes the remote run state and
//! signals the shared watch on the first terminal state it observes.
//! Refresh failures are logged and retried on the next tick; the waiter's
//! timeout is the backstop if the state never becomes readable.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use nimbus_client::DeviceCloud;
use nimbus_core::domain::run::RunHandle;

use super::WatchRegistry;

pub(super) fn spawn(
    cloud: Arc<dyn DeviceCloud>,
    registry: Arc<WatchRegistry>,
    handle: RunHandle,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);

        loop {
            ticker.tick().await;

            match cloud.get_run(handle).await {
                Ok(run) if run.state.is_terminal() => {
                    debug!("run {} reached {:?}", handle, run.state);
                    registry.complete(handle).await;
                    break;
                }
                Ok(run) => {
                    debug!("run {} still {:?}", handle, run.state);
                }
                Err(e) => {
                    warn!("state refresh for run {} failed: {}", handle, e);
                }
            }
        }
    })
}
