//! Collaborator interfaces consumed by the panic sequencer and stealth timeout
//!
//! Every platform service is a trait so a host can wire real SDK bindings and
//! tests can wire fakes. The submodules hold in-process implementations used
//! by the CLI.

pub mod lifecycle;
pub mod local;
pub mod process;
pub mod store;

use crate::constants::EARTH_RADIUS_KM;
use crate::error::SafetyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use lifecycle::{AppTransition, LifecycleHub, Subscription};
pub use process::{for_current_platform, ExitProcess, RetainProcess};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// An authenticated session as seen by the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

/// Message fanned out to recipients when panic mode fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub body: String,
    pub location: Option<GeoPoint>,
    pub sent_at: DateTime<Utc>,
}

/// Durable description of one panic activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub description: String,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> SafetyResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> SafetyResult<()>;
    async fn remove(&self, key: &str) -> SafetyResult<()>;
    /// Remove every key
    async fn clear(&self) -> SafetyResult<()>;
    async fn list_keys(&self) -> SafetyResult<Vec<String>>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Invalidate the remote session
    async fn sign_out(&self) -> SafetyResult<()>;
    async fn current_session(&self) -> SafetyResult<Option<Session>>;
    /// Drop whatever the app holds locally about the signed-in user
    async fn clear_local_session(&self) -> SafetyResult<()>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, timeout: Duration) -> SafetyResult<GeoPoint>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_to_recipient(&self, recipient_id: &str, payload: &AlertPayload)
        -> SafetyResult<()>;
}

/// Resolves who gets alerted. `None` location means "everyone known".
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn recipients_near(
        &self,
        location: Option<GeoPoint>,
        radius_km: f64,
    ) -> SafetyResult<Vec<String>>;
}

#[async_trait]
pub trait IncidentRecorder: Send + Sync {
    async fn create(&self, record: &IncidentRecord) -> SafetyResult<()>;
}

/// Source of foreground/background transitions. Dropping the returned
/// `Subscription` unsubscribes.
pub trait AppLifecycleObserver: Send + Sync {
    fn subscribe(&self, handler: Arc<dyn Fn(AppTransition) + Send + Sync>) -> Subscription;
}

/// Per-platform process termination strategy.
pub trait ProcessController: Send + Sync {
    fn supports_termination(&self) -> bool;
    /// Terminate the process. A no-op where termination is unsupported.
    fn terminate(&self);
}
