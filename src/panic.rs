//! Panic action sequencer
//!
//! Runs the fixed, ordered list of panic steps exactly once per session.
//! Each step is isolated: an error or a panic inside it is logged and
//! recorded in the report, and the sequence moves on. Alerting and incident creation run first
//! because they need the still-valid session; the local wipe runs before
//! sign-out so no authenticated call can race a half-cleared cache;
//! termination runs last, after sign-out side effects have settled.

use crate::constants::{
    ALERT_FANOUT_CONCURRENCY, ALERT_RADIUS_DEFAULT_KM, LOCATION_TIMEOUT_MS, SETTLE_DELAY_MS,
    SETTLE_TIMEOUT_MS, TERMINATE_DELAY_MS,
};
use crate::error::{SafetyError, SafetyResult};
use crate::platform::{
    AlertPayload, AuthService, GeoPoint, IncidentRecord, IncidentRecorder, KeyValueStore,
    LocationProvider, NotificationDispatcher, ProcessController, RecipientDirectory,
};
use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use log::{error, info, warn};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicStep {
    AcquireLocation,
    AlertRecipients,
    RecordIncident,
    ClearLocalData,
    SignOutRemote,
    ClearLocalSession,
    AwaitSettle,
    TerminateProcess,
}

impl fmt::Display for PanicStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PanicStep::AcquireLocation => "acquire-location",
            PanicStep::AlertRecipients => "alert-recipients",
            PanicStep::RecordIncident => "record-incident",
            PanicStep::ClearLocalData => "clear-local-data",
            PanicStep::SignOutRemote => "sign-out-remote",
            PanicStep::ClearLocalSession => "clear-local-session",
            PanicStep::AwaitSettle => "await-settle",
            PanicStep::TerminateProcess => "terminate-process",
        };
        f.write_str(name)
    }
}

/// Outcome of one panic run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanicReport {
    pub location: Option<GeoPoint>,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub incident_recorded: bool,
    pub local_data_cleared: bool,
    pub signed_out: bool,
    pub termination_requested: bool,
    /// True when the sequence panicked outside any step and the last-resort
    /// wipe ran instead
    pub fallback_used: bool,
    pub failures: Vec<(PanicStep, SafetyError)>,
}

impl PanicReport {
    pub fn failed(&self, step: PanicStep) -> bool {
        self.failures.iter().any(|(s, _)| *s == step)
    }

    fn record_failure(&mut self, step: PanicStep, err: SafetyError) {
        warn!("Panic step {} failed: {}", step, err);
        self.failures.push((step, err));
    }
}

/// Explicit "navigation finished" acknowledgment.
///
/// The host acknowledges once the signed-out screen is shown; the sequencer
/// waits for it before terminating. An acknowledgment that arrives before the
/// sequencer waits is kept.
#[derive(Clone, Default)]
pub struct NavigationAck {
    notify: Arc<Notify>,
}

impl NavigationAck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledge(&self) {
        self.notify.notify_one();
    }

    pub async fn wait(&self, timeout: Duration) -> SafetyResult<()> {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .map_err(|_| SafetyError::Timeout(timeout))
    }
}

/// Collaborators the sequence acts through.
#[derive(Clone)]
pub struct PanicServices {
    pub store: Arc<dyn KeyValueStore>,
    pub auth: Arc<dyn AuthService>,
    pub location: Arc<dyn LocationProvider>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub incidents: Arc<dyn IncidentRecorder>,
    pub process: Arc<dyn ProcessController>,
}

#[derive(Clone)]
pub struct PanicSettings {
    pub location_timeout: Duration,
    pub alert_radius_km: f64,
    pub fanout_concurrency: usize,
    /// Used when no `navigation_ack` is wired
    pub settle_delay: Duration,
    pub settle_timeout: Duration,
    pub terminate_delay: Duration,
    pub navigation_ack: Option<NavigationAck>,
}

impl Default for PanicSettings {
    fn default() -> Self {
        Self {
            location_timeout: Duration::from_millis(LOCATION_TIMEOUT_MS),
            alert_radius_km: ALERT_RADIUS_DEFAULT_KM,
            fanout_concurrency: ALERT_FANOUT_CONCURRENCY,
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            settle_timeout: Duration::from_millis(SETTLE_TIMEOUT_MS),
            terminate_delay: Duration::from_millis(TERMINATE_DELAY_MS),
            navigation_ack: None,
        }
    }
}

pub struct PanicActionSequencer {
    services: PanicServices,
    settings: PanicSettings,
    is_executing: AtomicBool,
}

impl PanicActionSequencer {
    pub fn new(services: PanicServices, settings: PanicSettings) -> Self {
        Self {
            services,
            settings,
            is_executing: AtomicBool::new(false),
        }
    }

    /// True once a run has started. Never resets within a session.
    pub fn is_executing(&self) -> bool {
        self.is_executing.load(Ordering::SeqCst)
    }

    fn claim(&self) -> bool {
        self.is_executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run the panic sequence. Returns `None` without doing anything if a run
    /// already started.
    pub async fn trigger(&self) -> Option<PanicReport> {
        // Claimed before the first await, so a concurrent caller sees it
        if !self.claim() {
            info!("Panic sequence already executing - ignoring trigger");
            return None;
        }
        Some(self.run_guarded().await)
    }

    /// Claim the run synchronously and execute it on a spawned task.
    ///
    /// For synchronous callers such as the gesture callback. Must be called
    /// from within a tokio runtime.
    pub fn spawn_trigger(self: &Arc<Self>) -> Option<JoinHandle<PanicReport>> {
        if !self.claim() {
            info!("Panic sequence already executing - ignoring trigger");
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run_guarded().await }))
    }

    async fn run_guarded(&self) -> PanicReport {
        warn!("PANIC MODE ACTIVATED");
        match AssertUnwindSafe(self.run_steps()).catch_unwind().await {
            Ok(report) => {
                info!(
                    "Panic sequence finished: {} alert(s) sent, {} step failure(s)",
                    report.alerts_sent,
                    report.failures.len()
                );
                report
            }
            Err(_) => {
                error!("Panic sequence aborted unexpectedly - running last-resort wipe");
                self.last_resort().await
            }
        }
    }

    async fn run_steps(&self) -> PanicReport {
        let mut report = PanicReport::default();

        // 1. Location (bounded; unknown on failure)
        match isolated(PanicStep::AcquireLocation, self.acquire_location()).await {
            Ok(point) => {
                info!(
                    "Location acquired: {:.5}, {:.5}",
                    point.latitude, point.longitude
                );
                report.location = Some(point);
            }
            Err(e) => report.record_failure(PanicStep::AcquireLocation, e),
        }

        // 2. Alert fan-out
        match isolated(
            PanicStep::AlertRecipients,
            self.alert_recipients(report.location),
        )
        .await
        {
            Ok((sent, failed)) => {
                report.alerts_sent = sent;
                report.alerts_failed = failed;
            }
            Err(e) => report.record_failure(PanicStep::AlertRecipients, e),
        }

        // 3. Incident record
        match isolated(PanicStep::RecordIncident, self.record_incident(&report)).await {
            Ok(()) => report.incident_recorded = true,
            Err(e) => report.record_failure(PanicStep::RecordIncident, e),
        }

        // 4-6. Wipe, then sign out
        self.wipe_and_sign_out(&mut report).await;

        // 7. Let sign-out side effects settle
        if let Err(e) = isolated(PanicStep::AwaitSettle, self.await_settle()).await {
            report.record_failure(PanicStep::AwaitSettle, e);
        }

        // 8. Terminate where supported
        if self.services.process.supports_termination() {
            tokio::time::sleep(self.settings.terminate_delay).await;
            report.termination_requested = true;
            let process = Arc::clone(&self.services.process);
            let terminated = isolated(PanicStep::TerminateProcess, async move {
                process.terminate();
                Ok(())
            });
            if let Err(e) = terminated.await {
                report.record_failure(PanicStep::TerminateProcess, e);
            }
        } else {
            info!("Process termination unsupported - leaving app signed out");
        }

        report
    }

    async fn wipe_and_sign_out(&self, report: &mut PanicReport) {
        match isolated(PanicStep::ClearLocalData, self.services.store.clear()).await {
            Ok(()) => {
                info!("Local data cleared");
                report.local_data_cleared = true;
            }
            Err(e) => report.record_failure(PanicStep::ClearLocalData, e),
        }

        match isolated(PanicStep::SignOutRemote, self.services.auth.sign_out()).await {
            Ok(()) => {
                info!("Remote session invalidated");
                report.signed_out = true;
            }
            Err(e) => report.record_failure(PanicStep::SignOutRemote, e),
        }

        match isolated(
            PanicStep::ClearLocalSession,
            self.services.auth.clear_local_session(),
        )
        .await
        {
            Ok(()) => info!("Local session cleared"),
            Err(e) => report.record_failure(PanicStep::ClearLocalSession, e),
        }
    }

    async fn last_resort(&self) -> PanicReport {
        let mut report = PanicReport {
            fallback_used: true,
            ..PanicReport::default()
        };
        // A second panic here has nowhere left to go
        if AssertUnwindSafe(self.wipe_and_sign_out(&mut report))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("Last-resort wipe aborted unexpectedly");
        }
        report
    }

    async fn acquire_location(&self) -> SafetyResult<GeoPoint> {
        let timeout = self.settings.location_timeout;
        tokio::time::timeout(timeout, self.services.location.current_position(timeout))
            .await
            .map_err(|_| SafetyError::Timeout(timeout))?
    }

    /// Returns (sent, failed). Individual send failures and panics are
    /// counted, not propagated; only a failed recipient lookup fails the step.
    async fn alert_recipients(&self, location: Option<GeoPoint>) -> SafetyResult<(usize, usize)> {
        let recipients = self
            .services
            .directory
            .recipients_near(location, self.settings.alert_radius_km)
            .await?;
        if recipients.is_empty() {
            info!("No recipients to alert");
            return Ok((0, 0));
        }

        let payload = Arc::new(alert_payload(location));
        let results: Vec<(String, SafetyResult<()>)> = stream::iter(recipients)
            .map(|id| {
                let dispatcher = Arc::clone(&self.services.dispatcher);
                let payload = Arc::clone(&payload);
                async move {
                    let result = AssertUnwindSafe(dispatcher.send_to_recipient(&id, &payload))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(SafetyError::Aborted(format!("send to {}", id)))
                        });
                    (id, result)
                }
            })
            .buffer_unordered(self.settings.fanout_concurrency.max(1))
            .collect()
            .await;

        let mut sent = 0;
        let mut failed = 0;
        for (id, result) in results {
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Alert to {} failed: {}", id, e);
                    failed += 1;
                }
            }
        }
        info!("Alerts: {} sent, {} failed", sent, failed);
        Ok((sent, failed))
    }

    async fn record_incident(&self, report: &PanicReport) -> SafetyResult<()> {
        let record = IncidentRecord {
            kind: "panic_activation".to_string(),
            occurred_at: Utc::now(),
            location: report.location,
            alerts_sent: report.alerts_sent,
            alerts_failed: report.alerts_failed,
            description: match report.location {
                Some(_) => "Panic mode activated".to_string(),
                None => "Panic mode activated (location unknown)".to_string(),
            },
        };
        self.services.incidents.create(&record).await
    }

    async fn await_settle(&self) -> SafetyResult<()> {
        match &self.settings.navigation_ack {
            Some(ack) => ack.wait(self.settings.settle_timeout).await,
            None => {
                tokio::time::sleep(self.settings.settle_delay).await;
                Ok(())
            }
        }
    }
}

/// Await one step, turning a panic inside it into an `Aborted` failure.
async fn isolated<T>(
    step: PanicStep,
    fut: impl Future<Output = SafetyResult<T>>,
) -> SafetyResult<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!("Panic step {} aborted unexpectedly", step);
            Err(SafetyError::Aborted(step.to_string()))
        }
    }
}

fn alert_payload(location: Option<GeoPoint>) -> AlertPayload {
    let body = match location {
        Some(p) => format!(
            "Someone nearby needs help at {:.5}, {:.5}",
            p.latitude, p.longitude
        ),
        None => "Someone you know needs help. Their location is unknown.".to_string(),
    };
    AlertPayload {
        title: "Emergency alert".to_string(),
        body,
        location,
        sent_at: Utc::now(),
    }
}
