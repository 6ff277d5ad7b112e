// Library interface for Guardian
// This allows tests and the CLI to access the crate's functionality

pub mod app_state;
pub mod auth;
pub mod config;
pub mod config_file;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod gesture;
pub mod panic;
pub mod platform;
pub mod stealth;
pub mod timer;
pub mod ui;
pub mod utils;

use app_state::AppState;
use constants::{
    PANIC_TAPS_MAX, PANIC_TAPS_MIN, PANIC_TAP_WINDOW_MAX_MS, PANIC_TAP_WINDOW_MIN_MS,
};
use error::{SafetyError, SafetyResult};
use gesture::{GestureTriggerDetector, TriggerSource};
use log::{error, info, warn};
use panic::{PanicActionSequencer, PanicReport, PanicServices, PanicSettings};
use parking_lot::Mutex;
use platform::{AppLifecycleObserver, AppTransition, Subscription};
use stealth::StealthAutoTimeout;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Gesture and stealth settings for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub trigger_source: TriggerSource,
    pub panic_taps: u32,
    pub tap_window: Duration,
    pub stealth_timeout_minutes: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            trigger_source: TriggerSource::ScreenTap,
            panic_taps: constants::PANIC_TAPS_DEFAULT,
            tap_window: Duration::from_millis(constants::PANIC_TAP_WINDOW_DEFAULT_MS),
            stealth_timeout_minutes: constants::STEALTH_TIMEOUT_DEFAULT_MINUTES,
        }
    }
}

impl SessionSettings {
    /// Reject values outside the configurable ranges
    pub fn validate(&self) -> SafetyResult<()> {
        if !(PANIC_TAPS_MIN..=PANIC_TAPS_MAX).contains(&self.panic_taps) {
            return Err(SafetyError::InvalidConfig(format!(
                "panic_taps must be {}-{} (got {})",
                PANIC_TAPS_MIN, PANIC_TAPS_MAX, self.panic_taps
            )));
        }
        let window_ms = self.tap_window.as_millis();
        if !(u128::from(PANIC_TAP_WINDOW_MIN_MS)..=u128::from(PANIC_TAP_WINDOW_MAX_MS))
            .contains(&window_ms)
        {
            return Err(SafetyError::InvalidConfig(format!(
                "tap_window must be {}-{}ms (got {}ms)",
                PANIC_TAP_WINDOW_MIN_MS, PANIC_TAP_WINDOW_MAX_MS, window_ms
            )));
        }
        stealth::validate_timeout_minutes(self.stealth_timeout_minutes)
    }
}

type PanicRunSlot = Arc<Mutex<Option<JoinHandle<PanicReport>>>>;

/// Core Guardian functionality a host screen drives
///
/// Must be created and used from within a tokio runtime.
pub struct SafetySession {
    pub state: AppState,
    settings: SessionSettings,
    detector: GestureTriggerDetector,
    sequencer: Arc<PanicActionSequencer>,
    stealth: StealthAutoTimeout,
    panic_run: PanicRunSlot,
    _foreground_tracking: Subscription,
}

impl SafetySession {
    /// Fails with `InvalidConfig` if `settings` are out of range.
    pub fn new(
        services: PanicServices,
        lifecycle: Arc<dyn AppLifecycleObserver>,
        settings: SessionSettings,
        panic_settings: PanicSettings,
    ) -> SafetyResult<Self> {
        settings.validate()?;

        let state = AppState::new();
        state.set_stealth_timeout_minutes(settings.stealth_timeout_minutes);

        let tracked = state.clone();
        let foreground_tracking = lifecycle.subscribe(Arc::new(move |transition| {
            tracked.set_foreground(transition == AppTransition::Foreground);
        }));

        Ok(Self {
            stealth: StealthAutoTimeout::new(state.clone(), lifecycle),
            state,
            settings,
            detector: GestureTriggerDetector::new(),
            sequencer: Arc::new(PanicActionSequencer::new(services, panic_settings)),
            panic_run: Arc::new(Mutex::new(None)),
            _foreground_tracking: foreground_tracking,
        })
    }

    /// Set the unlock code that leaves stealth mode
    pub fn set_unlock_code(&self, code: &str) {
        self.state.set_unlock_code_hash(auth::hash_unlock_code(code));
    }

    /// Start listening for the panic tap burst
    pub fn enable_panic_gesture(&self) -> SafetyResult<()> {
        gesture::ensure_source_supported(self.settings.trigger_source)?;

        let state = self.state.clone();
        let sequencer = Arc::clone(&self.sequencer);
        let slot = Arc::clone(&self.panic_run);

        self.detector.configure(
            self.settings.panic_taps,
            self.settings.tap_window,
            Arc::new(move || {
                state.mark_panic_triggered();
                if let Some(handle) = sequencer.spawn_trigger() {
                    *slot.lock() = Some(handle);
                }
            }),
        )?;
        self.state.set_panic_enabled(true);
        info!("Panic gesture enabled: {} taps", self.settings.panic_taps);
        Ok(())
    }

    pub fn disable_panic_gesture(&self) {
        self.detector.disable();
        self.state.set_panic_enabled(false);
    }

    /// Feed one tap. Returns true if it completed the panic gesture.
    pub fn record_tap(&self, timestamp: Instant) -> bool {
        self.record_interaction();
        self.detector.record_event(timestamp)
    }

    /// Taps counted toward the current burst
    pub fn pending_taps(&self) -> u32 {
        self.detector.pending_count()
    }

    /// Launch the panic sequence without the gesture.
    ///
    /// Returns false if a run already started this session.
    pub fn trigger_panic(&self) -> bool {
        self.state.mark_panic_triggered();
        match self.sequencer.spawn_trigger() {
            Some(handle) => {
                *self.panic_run.lock() = Some(handle);
                true
            }
            None => false,
        }
    }

    pub fn is_panic_executing(&self) -> bool {
        self.sequencer.is_executing()
    }

    /// Wait for a launched panic run to finish and return its report.
    ///
    /// Returns `None` if no run is pending or it was already collected.
    pub async fn wait_for_panic(&self) -> Option<PanicReport> {
        let handle = self.panic_run.lock().take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Panic task failed: {}", e);
                None
            }
        }
    }

    /// Show the disguise UI and arm the idle timeout
    pub fn enter_stealth(&self) -> SafetyResult<bool> {
        self.state.set_stealth_active(true);

        let state = self.state.clone();
        let armed = self.stealth.start(
            self.settings.stealth_timeout_minutes,
            Arc::new(move || state.set_stealth_active(false)),
        )?;
        info!("Stealth mode entered");
        Ok(armed)
    }

    /// Leave stealth mode with the unlock code
    ///
    /// Without a configured unlock code any input leaves stealth mode.
    pub fn exit_stealth(&self, code: &str) -> bool {
        if !self.state.is_stealth_active() {
            return false;
        }

        let accepted = match self.state.get_unlock_code_hash() {
            Some(hash) => auth::verify_unlock_code(code, &hash),
            None => {
                warn!("No unlock code configured - leaving stealth mode");
                true
            }
        };

        if accepted {
            self.stealth.stop();
            self.state.set_stealth_active(false);
            info!("Stealth mode left");
        } else {
            warn!("Invalid unlock code attempt");
        }
        accepted
    }

    pub fn is_stealth_active(&self) -> bool {
        self.state.is_stealth_active()
    }

    /// Note a user interaction; restarts the stealth idle timeout
    pub fn record_interaction(&self) {
        self.state.record_interaction();
        self.stealth.reset_timeout();
    }

    /// Time left before stealth mode times out, while armed
    pub fn stealth_remaining(&self) -> Option<Duration> {
        self.stealth.remaining()
    }
}
