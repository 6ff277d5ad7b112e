use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

// Re-export constants for callers that only import app_state
pub use crate::constants::{
    PANIC_TAPS_DEFAULT, PANIC_TAPS_MAX, PANIC_TAPS_MIN, PANIC_TAP_WINDOW_DEFAULT_MS,
    STEALTH_TIMEOUT_DEFAULT_MINUTES, STEALTH_TIMEOUT_MAX_MINUTES, STEALTH_TIMEOUT_MIN_MINUTES,
};

/// Session state shared between the host screen, the stealth timeout and
/// the panic gesture callback
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppStateInner>>,
}

pub struct AppStateInner {
    /// Whether the disguise UI is currently shown
    pub stealth_active: bool,
    /// When stealth mode was entered (for status display)
    pub stealth_entered_at: Option<Instant>,
    /// Unlock-code hash (SHA-256, hex-encoded) that leaves stealth mode
    pub unlock_code_hash: Option<String>,
    /// Whether the panic gesture is listened for
    pub panic_enabled: bool,
    /// Set once the panic sequence has been launched
    pub panic_triggered: bool,
    /// Whether the app is in the foreground
    pub foreground: bool,
    /// Last user interaction (tap, scroll, key)
    pub last_interaction: Instant,
    /// Stealth auto-timeout in minutes (see STEALTH_TIMEOUT_DEFAULT_MINUTES)
    pub stealth_timeout_minutes: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppStateInner {
                stealth_active: false,
                stealth_entered_at: None,
                unlock_code_hash: None,
                panic_enabled: false,
                panic_triggered: false,
                foreground: true,
                last_interaction: Instant::now(),
                stealth_timeout_minutes: STEALTH_TIMEOUT_DEFAULT_MINUTES,
            })),
        }
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, AppStateInner> {
        self.inner.lock()
    }

    pub fn is_stealth_active(&self) -> bool {
        self.inner.lock().stealth_active
    }

    pub fn set_stealth_active(&self, active: bool) {
        let mut state = self.inner.lock();
        state.stealth_active = active;

        if active {
            state.stealth_entered_at = Some(Instant::now());
            log::debug!("Stealth mode entered at {:?}", state.stealth_entered_at);
        } else {
            state.stealth_entered_at = None;
            log::debug!("Stealth mode left");
        }
    }

    /// Seconds spent in stealth mode, if active
    pub fn get_stealth_elapsed_secs(&self) -> Option<u64> {
        self.inner
            .lock()
            .stealth_entered_at
            .map(|t| t.elapsed().as_secs())
    }

    pub fn set_unlock_code_hash(&self, hash: String) {
        self.inner.lock().unlock_code_hash = Some(hash);
    }

    pub fn get_unlock_code_hash(&self) -> Option<String> {
        self.inner.lock().unlock_code_hash.clone()
    }

    pub fn is_panic_enabled(&self) -> bool {
        self.inner.lock().panic_enabled
    }

    pub fn set_panic_enabled(&self, enabled: bool) {
        self.inner.lock().panic_enabled = enabled;
    }

    pub fn is_panic_triggered(&self) -> bool {
        self.inner.lock().panic_triggered
    }

    pub fn mark_panic_triggered(&self) {
        self.inner.lock().panic_triggered = true;
    }

    pub fn is_foreground(&self) -> bool {
        self.inner.lock().foreground
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.inner.lock().foreground = foreground;
    }

    pub fn record_interaction(&self) {
        self.inner.lock().last_interaction = Instant::now();
    }

    pub fn get_idle_secs(&self) -> u64 {
        self.inner.lock().last_interaction.elapsed().as_secs()
    }

    pub fn get_stealth_timeout_minutes(&self) -> u64 {
        self.inner.lock().stealth_timeout_minutes
    }

    pub fn set_stealth_timeout_minutes(&self, minutes: u64) {
        self.inner.lock().stealth_timeout_minutes = minutes;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stealth_entered_time_recorded() {
        let state = AppState::new();
        assert!(state.get_stealth_elapsed_secs().is_none());

        state.set_stealth_active(true);
        {
            let inner = state.lock();
            assert!(
                inner.stealth_entered_at.is_some(),
                "Entry time should be recorded"
            );
        }

        state.set_stealth_active(false);
        {
            let inner = state.lock();
            assert!(
                inner.stealth_entered_at.is_none(),
                "Entry time should be cleared when leaving stealth"
            );
        }
    }

    #[test]
    fn test_stealth_elapsed_counts_up() {
        let state = AppState::new();
        state.set_stealth_active(true);
        thread::sleep(Duration::from_millis(1100));
        assert!(state.get_stealth_elapsed_secs().unwrap() >= 1);
    }

    #[test]
    fn test_interaction_resets_idle_clock() {
        let state = AppState::new();
        thread::sleep(Duration::from_millis(1100));
        assert!(state.get_idle_secs() >= 1);

        state.record_interaction();
        assert_eq!(state.get_idle_secs(), 0);
    }

    #[test]
    fn test_panic_triggered_is_sticky() {
        let state = AppState::new();
        assert!(!state.is_panic_triggered());
        state.mark_panic_triggered();
        assert!(state.is_panic_triggered());
    }

    #[test]
    fn test_default_timeout() {
        let state = AppState::new();
        assert_eq!(
            state.get_stealth_timeout_minutes(),
            STEALTH_TIMEOUT_DEFAULT_MINUTES
        );
        state.set_stealth_timeout_minutes(10);
        assert_eq!(state.get_stealth_timeout_minutes(), 10);
    }
}
