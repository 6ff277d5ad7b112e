//! Tap-burst detector for the panic gesture
//!
//! Counts qualifying input events and fires a callback once the configured
//! number of events arrives with no gap longer than the window between
//! consecutive events. A partial burst is discarded lazily on the next event
//! and eagerly by a deferred reset, so it never lingers.

use crate::error::{SafetyError, SafetyResult};
use crate::timer::DeferredTask;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Callback invoked once per completed burst.
pub type TriggerCallback = Arc<dyn Fn() + Send + Sync>;

/// Physical input that can feed the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerSource {
    #[default]
    ScreenTap,
    /// Hardware volume presses. Not observable without native bindings.
    VolumeButton,
}

/// Reject sources this build cannot listen to.
pub fn ensure_source_supported(source: TriggerSource) -> SafetyResult<()> {
    match source {
        TriggerSource::ScreenTap => Ok(()),
        TriggerSource::VolumeButton => Err(SafetyError::Unsupported(
            "volume-button gestures need native input bindings".to_string(),
        )),
    }
}

/// Counting state for one detector. Reset on a stale gap and after every
/// successful trigger.
#[derive(Debug, Clone)]
pub struct TriggerWindowState {
    pub count: u32,
    /// First event of the current burst
    pub window_start: Option<Instant>,
    /// Most recent event of the current burst
    pub last_event: Option<Instant>,
    pub required_count: u32,
    pub window_duration: Duration,
}

impl TriggerWindowState {
    fn new(required_count: u32, window_duration: Duration) -> Self {
        Self {
            count: 0,
            window_start: None,
            last_event: None,
            required_count,
            window_duration,
        }
    }

    fn clear(&mut self) {
        self.count = 0;
        self.window_start = None;
        self.last_event = None;
    }
}

struct DetectorInner {
    window: Option<TriggerWindowState>,
    on_triggered: Option<TriggerCallback>,
    reset_timer: DeferredTask,
    /// Bumped on every schedule/cancel so a stale reset task is a no-op
    generation: u64,
}

pub struct GestureTriggerDetector {
    inner: Arc<Mutex<DetectorInner>>,
}

impl GestureTriggerDetector {
    /// Create a disabled detector. Call `configure` to enable it.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DetectorInner {
                window: None,
                on_triggered: None,
                reset_timer: DeferredTask::new(),
                generation: 0,
            })),
        }
    }

    /// (Re)initialize the window and install the trigger callback.
    ///
    /// Fails fast on `required_count < 2` or a zero window.
    pub fn configure(
        &self,
        required_count: u32,
        window_duration: Duration,
        on_triggered: TriggerCallback,
    ) -> SafetyResult<()> {
        if required_count < 2 {
            return Err(SafetyError::InvalidConfig(format!(
                "required_count must be at least 2 (got {})",
                required_count
            )));
        }
        if window_duration.is_zero() {
            return Err(SafetyError::InvalidConfig(
                "window_duration must be greater than zero".to_string(),
            ));
        }

        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.reset_timer.cancel();
        inner.window = Some(TriggerWindowState::new(required_count, window_duration));
        inner.on_triggered = Some(on_triggered);
        info!(
            "Gesture detector configured: {} events within {}ms gaps",
            required_count,
            window_duration.as_millis()
        );
        Ok(())
    }

    /// Turn the detector off and cancel any pending deferred reset.
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.reset_timer.cancel();
        inner.window = None;
        inner.on_triggered = None;
        debug!("Gesture detector disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().window.is_some()
    }

    /// Events counted toward the current burst (0 when disabled).
    pub fn pending_count(&self) -> u32 {
        self.inner.lock().window.as_ref().map_or(0, |w| w.count)
    }

    /// Feed one qualifying event. Returns true if this event completed a burst.
    ///
    /// Timestamps must be non-decreasing. Ignored while disabled. Schedules the
    /// deferred reset on the current tokio runtime.
    pub fn record_event(&self, timestamp: Instant) -> bool {
        let callback = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let Some(window) = inner.window.as_mut() else {
                return false;
            };

            let stale = window
                .last_event
                .is_some_and(|last| timestamp.saturating_duration_since(last) > window.window_duration);
            if stale {
                debug!("Discarding stale burst of {} events", window.count);
                window.clear();
            }
            if window.count == 0 {
                window.window_start = Some(timestamp);
            }
            window.last_event = Some(timestamp);
            window.count += 1;

            if window.count >= window.required_count {
                info!("Gesture completed after {} events", window.count);
                window.clear();
                inner.generation += 1;
                inner.reset_timer.cancel();
                inner.on_triggered.clone()
            } else {
                debug!("Gesture progress: {}/{}", window.count, window.required_count);
                inner.generation += 1;
                let generation = inner.generation;
                let delay = window.window_duration;
                let weak = Arc::downgrade(&self.inner);
                inner
                    .reset_timer
                    .schedule(delay, move || expire_window(weak, generation));
                None
            }
        };

        // State is settled and the lock released before user code runs
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }
}

impl Default for GestureTriggerDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn expire_window(inner: Weak<Mutex<DetectorInner>>, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = inner.lock();
    if inner.generation != generation {
        return;
    }
    if let Some(window) = inner.window.as_mut() {
        if window.count > 0 {
            debug!("Gesture window expired with {} events", window.count);
        }
        window.clear();
    }
}
