//! Single-slot cancellable deferred task
//!
//! Both the gesture window reset and the stealth idle timeout need "at most
//! one live timer": scheduling always aborts the previous task first. Owners
//! also stamp each schedule with a generation and re-check it when the task
//! fires, since an aborted task may already be past its sleep.

use log::debug;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct DeferredTask {
    handle: Option<JoinHandle<()>>,
}

impl DeferredTask {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Cancel any pending task, then run `f` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        debug!("Scheduling deferred task in {}ms", delay.as_millis());
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }

    /// Abort the pending task, if any. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    debug!("Cancelled pending deferred task");
                }
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = DeferredTask::new();

        let counter = fired.clone();
        task.schedule(Duration::from_secs(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = DeferredTask::new();

        for _ in 0..3 {
            let counter = fired.clone();
            task.schedule(Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "Only the last schedule may fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = DeferredTask::new();

        let counter = fired.clone();
        task.schedule(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.cancel());
        assert!(!task.cancel(), "Second cancel has nothing to cancel");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
