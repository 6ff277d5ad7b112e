//! Offline implementations of the collaborator traits
//!
//! These back the CLI drill harness: nothing leaves the machine, but every
//! step of the panic sequence has a real effect (store wiped, session key
//! removed, incident appended to a log).

use super::{
    AlertPayload, AuthService, GeoPoint, IncidentRecord, IncidentRecorder, KeyValueStore,
    LocationProvider, NotificationDispatcher, RecipientDirectory, Session,
};
use crate::error::{SafetyError, SafetyResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Store key holding the serialized `Session`.
pub const SESSION_KEY: &str = "auth.session";

/// Auth backed by the local store only; there is no remote session to revoke.
pub struct OfflineAuth {
    store: Arc<dyn KeyValueStore>,
}

impl OfflineAuth {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn sign_in(&self, session: &Session) -> SafetyResult<()> {
        let json = serde_json::to_string(session)?;
        self.store.set(SESSION_KEY, &json).await?;
        info!("Signed in as {}", session.user_id);
        Ok(())
    }
}

#[async_trait]
impl AuthService for OfflineAuth {
    async fn sign_out(&self) -> SafetyResult<()> {
        info!("No remote auth service configured - nothing to revoke");
        Ok(())
    }

    async fn current_session(&self) -> SafetyResult<Option<Session>> {
        match self.store.get(SESSION_KEY).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn clear_local_session(&self) -> SafetyResult<()> {
        self.store.remove(SESSION_KEY).await
    }
}

/// Appends one JSON line per incident and syncs it to disk.
pub struct JsonlIncidentRecorder {
    path: PathBuf,
}

impl JsonlIncidentRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IncidentRecorder for JsonlIncidentRecorder {
    async fn create(&self, record: &IncidentRecord) -> SafetyResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        info!("Incident recorded to {}", self.path.display());
        Ok(())
    }
}

/// A trusted contact from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Last known location, if the contact shares one
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Directory over a fixed contact list.
///
/// With a known location only contacts within the radius are returned;
/// contacts without a location are always included since their distance is
/// unknown. Without a location every contact is returned.
pub struct ContactDirectory {
    contacts: Vec<Contact>,
}

impl ContactDirectory {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl RecipientDirectory for ContactDirectory {
    async fn recipients_near(
        &self,
        location: Option<GeoPoint>,
        radius_km: f64,
    ) -> SafetyResult<Vec<String>> {
        let ids = self
            .contacts
            .iter()
            .filter(|c| match (location, c.location) {
                (Some(here), Some(there)) => here.distance_km(&there) <= radius_km,
                _ => true,
            })
            .map(|c| c.id.clone())
            .collect::<Vec<_>>();
        debug!(
            "{} of {} contact(s) selected for alert",
            ids.len(),
            self.contacts.len()
        );
        Ok(ids)
    }
}

/// Writes each alert to the log instead of a push service.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send_to_recipient(
        &self,
        recipient_id: &str,
        payload: &AlertPayload,
    ) -> SafetyResult<()> {
        warn!(
            "ALERT -> {}: {} ({})",
            recipient_id, payload.title, payload.body
        );
        Ok(())
    }
}

/// Location fixed at configuration time. `None` behaves like a device with
/// location permission denied.
pub struct StaticLocation {
    point: Option<GeoPoint>,
}

impl StaticLocation {
    pub fn new(point: Option<GeoPoint>) -> Self {
        Self { point }
    }
}

#[async_trait]
impl LocationProvider for StaticLocation {
    async fn current_position(&self, _timeout: Duration) -> SafetyResult<GeoPoint> {
        self.point.ok_or_else(|| {
            SafetyError::PermissionDenied("no location configured".to_string())
        })
    }
}
