//! Foreground/background transition fan-out

use super::AppLifecycleObserver;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppTransition {
    Foreground,
    Background,
}

type Handler = Arc<dyn Fn(AppTransition) + Send + Sync>;

/// Handle returned by `AppLifecycleObserver::subscribe`; unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Explicit form of dropping the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// In-process lifecycle source. The host calls `emit` when the app moves
/// between foreground and background.
#[derive(Clone, Default)]
pub struct LifecycleHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LifecycleHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a transition to every current subscriber.
    ///
    /// Handlers run outside the hub lock, so they may subscribe or
    /// unsubscribe while being notified.
    pub fn emit(&self, transition: AppTransition) {
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        debug!(
            "App transition {:?} -> {} subscriber(s)",
            transition,
            handlers.len()
        );
        for handler in handlers {
            handler(transition);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

impl AppLifecycleObserver for LifecycleHub {
    fn subscribe(&self, handler: Handler) -> Subscription {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.handlers.push((id, handler));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().handlers.retain(|(hid, _)| *hid != id);
            }
        })
    }
}
