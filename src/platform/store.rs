//! Key-value stores: in-memory and an encrypted JSON file

use super::KeyValueStore;
use crate::crypto;
use crate::error::{SafetyError, SafetyResult};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> SafetyResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SafetyResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> SafetyResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> SafetyResult<()> {
        self.entries.lock().clear();
        Ok(())
    }

    async fn list_keys(&self) -> SafetyResult<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Store persisted as one JSON object. Keys are plain, values are sealed
/// with `crypto::seal` under their own key.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    io_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> SafetyResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> SafetyResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;

        #[cfg(unix)]
        {
            let permissions =
                std::fs::Permissions::from_mode(crate::constants::CONFIG_FILE_PERMISSIONS);
            tokio::fs::set_permissions(&tmp, permissions).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Store written: {} key(s)", entries.len());
        Ok(())
    }
}

fn seal(key: &str, value: &str) -> SafetyResult<String> {
    crypto::seal(value, key).map_err(|e| SafetyError::TransientIo(format!("{:#}", e)))
}

fn unseal(key: &str, sealed: &str) -> SafetyResult<String> {
    crypto::open(sealed, key).map_err(|e| SafetyError::TransientIo(format!("{:#}", e)))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> SafetyResult<Option<String>> {
        let _guard = self.io_lock.lock().await;
        let entries = self.read_entries().await?;
        entries.get(key).map(|v| unseal(key, v)).transpose()
    }

    async fn set(&self, key: &str, value: &str) -> SafetyResult<()> {
        let _guard = self.io_lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), seal(key, value)?);
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> SafetyResult<()> {
        let _guard = self.io_lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> SafetyResult<()> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Local store cleared: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> SafetyResult<Vec<String>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_entries().await?.into_keys().collect())
    }
}
