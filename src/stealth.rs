//! Stealth-mode inactivity timeout
//!
//! Inactive -> start() -> Armed -> (fires | stop()) -> Inactive, with
//! Armed <-> Suspended on background/foreground transitions. The idle clock
//! does not run while backgrounded: going to background cancels the timer and
//! coming back re-arms a full duration.

use crate::app_state::AppState;
use crate::constants::{STEALTH_TIMEOUT_MAX_MINUTES, STEALTH_TIMEOUT_MIN_MINUTES};
use crate::error::{SafetyError, SafetyResult};
use crate::platform::{AppLifecycleObserver, AppTransition, Subscription};
use crate::timer::DeferredTask;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

pub type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Inactive,
    Armed,
    /// App is backgrounded; no timer is live
    Suspended,
}

struct IdleInner {
    phase: IdlePhase,
    timeout: Duration,
    on_timeout: Option<TimeoutCallback>,
    timer: DeferredTask,
    generation: u64,
    deadline: Option<Instant>,
    last_activity: Option<Instant>,
    subscription: Option<Subscription>,
}

pub struct StealthAutoTimeout {
    state: AppState,
    lifecycle: Arc<dyn AppLifecycleObserver>,
    inner: Arc<Mutex<IdleInner>>,
}

impl StealthAutoTimeout {
    pub fn new(state: AppState, lifecycle: Arc<dyn AppLifecycleObserver>) -> Self {
        Self {
            state,
            lifecycle,
            inner: Arc::new(Mutex::new(IdleInner {
                phase: IdlePhase::Inactive,
                timeout: Duration::ZERO,
                on_timeout: None,
                timer: DeferredTask::new(),
                generation: 0,
                deadline: None,
                last_activity: None,
                subscription: None,
            })),
        }
    }

    /// Arm the timeout and start following app transitions.
    ///
    /// Returns `Ok(false)` without arming when stealth mode is not active.
    /// Calling it while armed restarts the full duration with the new callback.
    /// Started while backgrounded, it waits `Suspended` for the next foreground.
    pub fn start(&self, timeout_minutes: u64, on_timeout: TimeoutCallback) -> SafetyResult<bool> {
        validate_timeout_minutes(timeout_minutes)?;
        if !self.state.is_stealth_active() {
            debug!("Stealth mode not active - auto-timeout not started");
            return Ok(false);
        }

        let weak = Arc::downgrade(&self.inner);
        let subscription = self
            .lifecycle
            .subscribe(Arc::new(move |transition| handle_transition(&weak, transition)));

        let foreground = self.state.is_foreground();
        let previous = {
            let mut inner = self.inner.lock();
            inner.timeout = Duration::from_secs(timeout_minutes * 60);
            inner.on_timeout = Some(on_timeout);
            inner.last_activity = Some(Instant::now());
            if foreground {
                inner.phase = IdlePhase::Armed;
                arm(&mut inner, &self.inner);
            } else {
                disarm(&mut inner);
                inner.phase = IdlePhase::Suspended;
            }
            inner.subscription.replace(subscription)
        };
        drop(previous);

        if foreground {
            info!("Stealth auto-timeout armed: {} minute(s)", timeout_minutes);
        } else {
            info!(
                "Stealth auto-timeout set to {} minute(s) - waiting for foreground",
                timeout_minutes
            );
        }
        Ok(true)
    }

    /// Restart the full duration from now. Call on every user interaction.
    ///
    /// Returns true if a live timer was rescheduled.
    pub fn reset_timeout(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.last_activity = Some(Instant::now());
        if inner.phase != IdlePhase::Armed {
            return false;
        }
        arm(&mut inner, &self.inner);
        true
    }

    /// Tear down: cancel the timer and stop following app transitions.
    pub fn stop(&self) {
        let subscription = {
            let mut inner = self.inner.lock();
            if inner.phase != IdlePhase::Inactive {
                debug!("Stealth auto-timeout stopped");
            }
            disarm(&mut inner);
            inner.phase = IdlePhase::Inactive;
            inner.on_timeout = None;
            inner.subscription.take()
        };
        drop(subscription);
    }

    pub fn phase(&self) -> IdlePhase {
        self.inner.lock().phase
    }

    /// Time left before the timeout fires, while armed
    pub fn remaining(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        match inner.phase {
            IdlePhase::Armed => inner
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.inner.lock().last_activity
    }
}

/// Accepts whole minutes in the configurable range.
pub fn validate_timeout_minutes(minutes: u64) -> SafetyResult<()> {
    if !(STEALTH_TIMEOUT_MIN_MINUTES..=STEALTH_TIMEOUT_MAX_MINUTES).contains(&minutes) {
        return Err(SafetyError::InvalidConfig(format!(
            "stealth timeout must be {}-{} minutes (got {})",
            STEALTH_TIMEOUT_MIN_MINUTES, STEALTH_TIMEOUT_MAX_MINUTES, minutes
        )));
    }
    Ok(())
}

/// Cancel any live timer and schedule a fresh full-duration one.
fn arm(inner: &mut IdleInner, shared: &Arc<Mutex<IdleInner>>) {
    inner.generation += 1;
    let generation = inner.generation;
    let weak = Arc::downgrade(shared);
    inner.deadline = Some(Instant::now() + inner.timeout);
    inner
        .timer
        .schedule(inner.timeout, move || fire(weak, generation));
}

fn disarm(inner: &mut IdleInner) {
    inner.generation += 1;
    inner.timer.cancel();
    inner.deadline = None;
}

fn fire(shared: Weak<Mutex<IdleInner>>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let (callback, subscription) = {
        let mut inner = shared.lock();
        if inner.generation != generation || inner.phase != IdlePhase::Armed {
            return;
        }
        inner.phase = IdlePhase::Inactive;
        inner.deadline = None;
        (inner.on_timeout.take(), inner.subscription.take())
    };
    drop(subscription);

    info!("Stealth auto-timeout reached - deactivating");
    if let Some(cb) = callback {
        cb();
    }
}

fn handle_transition(shared: &Weak<Mutex<IdleInner>>, transition: AppTransition) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.lock();
    match (inner.phase, transition) {
        (IdlePhase::Armed, AppTransition::Background) => {
            disarm(&mut inner);
            inner.phase = IdlePhase::Suspended;
            debug!("App backgrounded - stealth auto-timeout suspended");
        }
        (IdlePhase::Suspended, AppTransition::Foreground) => {
            inner.phase = IdlePhase::Armed;
            arm(&mut inner, &shared);
            debug!("App foregrounded - stealth auto-timeout re-armed");
        }
        _ => {}
    }
}
