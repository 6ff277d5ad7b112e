use async_trait::async_trait;
use guardian::error::{SafetyError, SafetyResult};
use guardian::panic::{
    NavigationAck, PanicActionSequencer, PanicServices, PanicSettings, PanicStep,
};
use guardian::platform::{
    AlertPayload, AuthService, GeoPoint, IncidentRecord, IncidentRecorder, KeyValueStore,
    LocationProvider, NotificationDispatcher, ProcessController, RecipientDirectory, Session,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared call log so tests can assert on step order
#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("'{}' was never called", entry))
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

struct FakeStore {
    log: CallLog,
    fail_clear: bool,
}

#[async_trait]
impl KeyValueStore for FakeStore {
    async fn get(&self, _key: &str) -> SafetyResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> SafetyResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> SafetyResult<()> {
        Ok(())
    }

    async fn clear(&self) -> SafetyResult<()> {
        self.log.push("store.clear");
        if self.fail_clear {
            return Err(SafetyError::TransientIo("disk full".to_string()));
        }
        Ok(())
    }

    async fn list_keys(&self) -> SafetyResult<Vec<String>> {
        Ok(Vec::new())
    }
}

struct FakeAuth {
    log: CallLog,
    fail_sign_out: bool,
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_out(&self) -> SafetyResult<()> {
        self.log.push("auth.sign_out");
        if self.fail_sign_out {
            return Err(SafetyError::TransientIo("network unreachable".to_string()));
        }
        Ok(())
    }

    async fn current_session(&self) -> SafetyResult<Option<Session>> {
        Ok(None)
    }

    async fn clear_local_session(&self) -> SafetyResult<()> {
        self.log.push("auth.clear_local_session");
        Ok(())
    }
}

struct FakeLocation {
    log: CallLog,
    point: Option<GeoPoint>,
    delay: Duration,
    blow_up: bool,
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn current_position(&self, _timeout: Duration) -> SafetyResult<GeoPoint> {
        self.log.push("location");
        tokio::time::sleep(self.delay).await;
        if self.blow_up {
            panic!("location provider bug");
        }
        self.point
            .ok_or_else(|| SafetyError::PermissionDenied("location".to_string()))
    }
}

struct FakeDirectory {
    log: CallLog,
    recipients: Vec<String>,
    seen_location: Mutex<Option<Option<GeoPoint>>>,
}

#[async_trait]
impl RecipientDirectory for FakeDirectory {
    async fn recipients_near(
        &self,
        location: Option<GeoPoint>,
        _radius_km: f64,
    ) -> SafetyResult<Vec<String>> {
        self.log.push("directory");
        *self.seen_location.lock() = Some(location);
        Ok(self.recipients.clone())
    }
}

struct FakeDispatcher {
    log: CallLog,
    fail_all: bool,
    panic_for: Option<String>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl NotificationDispatcher for FakeDispatcher {
    async fn send_to_recipient(
        &self,
        recipient_id: &str,
        _payload: &AlertPayload,
    ) -> SafetyResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.log.push(format!("send:{}", recipient_id));
        if self.panic_for.as_deref() == Some(recipient_id) {
            panic!("dispatcher bug for {}", recipient_id);
        }
        if self.fail_all {
            return Err(SafetyError::TransientIo("push gateway down".to_string()));
        }
        Ok(())
    }
}

struct FakeIncidents {
    log: CallLog,
    blow_up: bool,
}

#[async_trait]
impl IncidentRecorder for FakeIncidents {
    async fn create(&self, record: &IncidentRecord) -> SafetyResult<()> {
        if self.blow_up {
            panic!("incident recorder bug");
        }
        self.log.push(format!("incident:{}", record.alerts_sent));
        Ok(())
    }
}

struct FakeProcess {
    log: CallLog,
    supports: bool,
    terminated: AtomicBool,
}

impl ProcessController for FakeProcess {
    fn supports_termination(&self) -> bool {
        self.supports
    }

    fn terminate(&self) {
        self.log.push("terminate");
        self.terminated.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    log: CallLog,
    fail_clear: bool,
    fail_sign_out: bool,
    point: Option<GeoPoint>,
    location_delay: Duration,
    location_panics: bool,
    recipients: Vec<String>,
    fail_sends: bool,
    send_panics_for: Option<String>,
    send_latency: Duration,
    recorder_panics: bool,
    supports_termination: bool,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            log: CallLog::default(),
            fail_clear: false,
            fail_sign_out: false,
            point: Some(GeoPoint::new(40.7128, -74.0060)),
            location_delay: Duration::from_millis(50),
            location_panics: false,
            recipients: vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
            fail_sends: false,
            send_panics_for: None,
            send_latency: Duration::from_millis(20),
            recorder_panics: false,
            supports_termination: true,
        }
    }
}

struct Built {
    sequencer: Arc<PanicActionSequencer>,
    directory: Arc<FakeDirectory>,
    dispatcher: Arc<FakeDispatcher>,
    process: Arc<FakeProcess>,
}

impl Harness {
    fn build(self, settings: PanicSettings) -> Built {
        let directory = Arc::new(FakeDirectory {
            log: self.log.clone(),
            recipients: self.recipients,
            seen_location: Mutex::new(None),
        });
        let dispatcher = Arc::new(FakeDispatcher {
            log: self.log.clone(),
            fail_all: self.fail_sends,
            panic_for: self.send_panics_for,
            latency: self.send_latency,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let process = Arc::new(FakeProcess {
            log: self.log.clone(),
            supports: self.supports_termination,
            terminated: AtomicBool::new(false),
        });

        let services = PanicServices {
            store: Arc::new(FakeStore {
                log: self.log.clone(),
                fail_clear: self.fail_clear,
            }),
            auth: Arc::new(FakeAuth {
                log: self.log.clone(),
                fail_sign_out: self.fail_sign_out,
            }),
            location: Arc::new(FakeLocation {
                log: self.log.clone(),
                point: self.point,
                delay: self.location_delay,
                blow_up: self.location_panics,
            }),
            directory: directory.clone(),
            dispatcher: dispatcher.clone(),
            incidents: Arc::new(FakeIncidents {
                log: self.log.clone(),
                blow_up: self.recorder_panics,
            }),
            process: process.clone(),
        };

        Built {
            sequencer: Arc::new(PanicActionSequencer::new(services, settings)),
            directory,
            dispatcher,
            process,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_steps_run_in_order() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.expect("first trigger runs");

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.alerts_sent, 3);
    assert!(report.incident_recorded);
    assert!(report.local_data_cleared);
    assert!(report.signed_out);
    assert!(report.termination_requested);
    assert!(!report.fallback_used);

    assert!(log.position("location") < log.position("directory"));
    for id in ["alice", "bob", "carol"] {
        assert!(log.position(&format!("send:{}", id)) < log.position("incident:3"));
    }
    assert!(log.position("incident:3") < log.position("store.clear"));
    assert!(log.position("store.clear") < log.position("auth.sign_out"));
    assert!(log.position("auth.sign_out") < log.position("auth.clear_local_session"));
    assert!(log.position("auth.clear_local_session") < log.position("terminate"));
    assert_eq!(log.entries().last().map(String::as_str), Some("terminate"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_run_once() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let seq = built.sequencer.clone();
    let (a, b) = tokio::join!(seq.trigger(), seq.trigger());

    assert_eq!(
        [a.is_some(), b.is_some()].iter().filter(|ran| **ran).count(),
        1,
        "Exactly one trigger should run"
    );
    assert_eq!(log.count_prefix("send:"), 3, "Alerts must not be duplicated");
    assert_eq!(log.count_prefix("store.clear"), 1);
    assert_eq!(log.count_prefix("terminate"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_after_completion_is_ignored() {
    let built = Harness::default().build(PanicSettings::default());

    assert!(built.sequencer.trigger().await.is_some());
    assert!(built.sequencer.is_executing(), "Flag never resets in a session");
    assert!(built.sequencer.trigger().await.is_none());
    assert!(built.sequencer.spawn_trigger().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_spawn_trigger_claims_synchronously() {
    let built = Harness::default().build(PanicSettings::default());

    let handle = built.sequencer.spawn_trigger().expect("first spawn runs");
    assert!(built.sequencer.is_executing());
    assert!(built.sequencer.spawn_trigger().is_none());

    let report = handle.await.unwrap();
    assert_eq!(report.alerts_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_alerts_do_not_stop_the_sequence() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        fail_sends: true,
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert_eq!(report.alerts_sent, 0);
    assert_eq!(report.alerts_failed, 3);
    assert!(report.incident_recorded);
    assert!(report.local_data_cleared);
    assert!(report.signed_out);
    assert!(built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_every_step_failing_still_terminates() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        point: None,
        fail_sends: true,
        fail_clear: true,
        fail_sign_out: true,
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert!(report.failed(PanicStep::AcquireLocation));
    assert!(report.failed(PanicStep::ClearLocalData));
    assert!(report.failed(PanicStep::SignOutRemote));
    assert!(!report.local_data_cleared);
    assert!(!report.signed_out);
    // Later steps still ran
    assert_eq!(log.count_prefix("auth.clear_local_session"), 1);
    assert!(built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_slow_location_times_out_to_unknown() {
    let built = Harness {
        location_delay: Duration::from_secs(30),
        ..Harness::default()
    }
    .build(PanicSettings {
        location_timeout: Duration::from_secs(5),
        ..PanicSettings::default()
    });

    let started = tokio::time::Instant::now();
    let report = built.sequencer.trigger().await.unwrap();

    assert!(report.location.is_none());
    assert!(report
        .failures
        .iter()
        .any(|(step, err)| *step == PanicStep::AcquireLocation
            && matches!(err, SafetyError::Timeout(_))));
    assert_eq!(*built.directory.seen_location.lock(), Some(None));
    assert_eq!(report.alerts_sent, 3, "Alerts go out without a location");
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_recorder_fails_only_its_step() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        recorder_panics: true,
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert!(!report.fallback_used);
    assert!(!report.incident_recorded);
    assert!(report
        .failures
        .iter()
        .any(|(step, err)| *step == PanicStep::RecordIncident
            && matches!(err, SafetyError::Aborted(_))));
    assert_eq!(report.alerts_sent, 3);
    assert!(report.local_data_cleared);
    assert!(report.signed_out);
    assert_eq!(log.count_prefix("auth.clear_local_session"), 1);
    assert!(report.termination_requested);
    assert!(built.process.terminated.load(Ordering::SeqCst));
    assert!(built.sequencer.is_executing());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_location_provider_still_alerts() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        location_panics: true,
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert!(!report.fallback_used);
    assert!(report.location.is_none());
    assert!(report
        .failures
        .iter()
        .any(|(step, err)| *step == PanicStep::AcquireLocation
            && matches!(err, SafetyError::Aborted(_))));
    assert_eq!(*built.directory.seen_location.lock(), Some(None));
    assert_eq!(report.alerts_sent, 3);
    assert!(report.incident_recorded);
    assert_eq!(log.count_prefix("incident:3"), 1);
    assert!(report.local_data_cleared);
    assert!(report.signed_out);
    assert!(built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_panic_counts_as_one_failed_send() {
    let log = CallLog::default();
    let built = Harness {
        log: log.clone(),
        send_panics_for: Some("bob".to_string()),
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert!(!report.fallback_used);
    assert!(!report.failed(PanicStep::AlertRecipients));
    assert_eq!(report.alerts_sent, 2);
    assert_eq!(report.alerts_failed, 1);
    assert_eq!(log.count_prefix("send:alice"), 1);
    assert_eq!(log.count_prefix("send:carol"), 1);
    assert_eq!(log.count_prefix("send:bob"), 1);
    assert_eq!(log.count_prefix("incident:2"), 1);
    assert!(report.incident_recorded);
    assert!(report.local_data_cleared);
    assert!(built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_no_termination_where_unsupported() {
    let built = Harness {
        supports_termination: false,
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();

    assert!(report.signed_out);
    assert!(!report.termination_requested);
    assert!(!built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_is_bounded() {
    let recipients: Vec<String> = (0..25).map(|i| format!("contact-{}", i)).collect();
    let built = Harness {
        recipients,
        send_latency: Duration::from_millis(100),
        ..Harness::default()
    }
    .build(PanicSettings {
        fanout_concurrency: 4,
        ..PanicSettings::default()
    });

    let report = built.sequencer.trigger().await.unwrap();

    assert_eq!(report.alerts_sent, 25);
    let peak = built.dispatcher.max_in_flight.load(Ordering::SeqCst);
    assert!(peak > 1, "Sends should overlap");
    assert!(peak <= 4, "At most 4 sends in flight, saw {}", peak);
}

#[tokio::test(start_paused = true)]
async fn test_no_recipients_is_not_a_failure() {
    let built = Harness {
        recipients: Vec::new(),
        ..Harness::default()
    }
    .build(PanicSettings::default());

    let report = built.sequencer.trigger().await.unwrap();
    assert_eq!(report.alerts_sent, 0);
    assert!(!report.failed(PanicStep::AlertRecipients));
    assert!(report.incident_recorded);
}

#[tokio::test(start_paused = true)]
async fn test_termination_waits_for_navigation_ack() {
    let ack = NavigationAck::new();
    let built = Harness::default().build(PanicSettings {
        navigation_ack: Some(ack.clone()),
        settle_timeout: Duration::from_secs(60),
        ..PanicSettings::default()
    });

    let handle = built.sequencer.spawn_trigger().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(
        !built.process.terminated.load(Ordering::SeqCst),
        "Must not terminate before the ack"
    );

    ack.acknowledge();
    let report = handle.await.unwrap();
    assert!(!report.failed(PanicStep::AwaitSettle));
    assert!(built.process.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_missing_navigation_ack_times_out() {
    let built = Harness::default().build(PanicSettings {
        navigation_ack: Some(NavigationAck::new()),
        settle_timeout: Duration::from_secs(3),
        ..PanicSettings::default()
    });

    let report = built.sequencer.trigger().await.unwrap();
    assert!(report.failed(PanicStep::AwaitSettle));
    assert!(built.process.terminated.load(Ordering::SeqCst));
}
