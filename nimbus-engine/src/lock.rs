//! Mutual exclusion for the configure+submit critical section
//!
//! The remote project's configuration record is shared by every job that
//! targets the project, and a run must be submitted against the
//! configuration this job just pushed. The lock keeps another job's
//! configuration write from landing in between.
//!
//! The lock is an explicit injectable value scoped to the runner that
//! owns it, not a process-global, so tests can build as many independent
//! locks as they need.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Clonable handle to one shared submission lock.
///
/// `acquire` has no timeout: a submission stuck in a remote call while
/// holding the lock starves every later submission until it returns.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of the critical section; releases on drop, so
/// release happens exactly once on every exit path.
#[derive(Debug)]
pub struct RunGuard<'a> {
    _permit: MutexGuard<'a, ()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the critical section is free.
    pub async fn acquire(&self) -> RunGuard<'_> {
        RunGuard {
            _permit: self.inner.lock().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = RunLock::new();
        {
            let _guard = lock.acquire().await;
        }
        // A second acquire must not block once the first guard is gone.
        let _guard = lock.acquire().await;
    }

    #[tokio::test]
    async fn critical_sections_do_not_overlap() {
        let lock = RunLock::new();
        let events = Arc::new(StdMutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for job in 0..2u32 {
            let lock = lock.clone();
            let events = Arc::clone(&events);
            tasks.push(tokio::spawn(async move {
                let _guard = lock.acquire().await;
                events.lock().unwrap().push((job, "enter"));
                tokio::time::sleep(Duration::from_millis(10)).await;
                events.lock().unwrap().push((job, "exit"));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        // Whoever entered first must exit before the other enters.
        assert_eq!(events[0].0, events[1].0);
        assert_eq!(events[2].0, events[3].0);
        assert_ne!(events[0].0, events[2].0);
    }
}
