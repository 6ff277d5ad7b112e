//! Configuration file management with encrypted unlock-code storage
//!
//! This module handles loading and saving the application configuration file,
//! which holds the encrypted stealth unlock code, gesture and timeout settings,
//! and the trusted contacts alerted in panic mode.

use crate::app_state::{
    PANIC_TAPS_DEFAULT, PANIC_TAPS_MAX, PANIC_TAPS_MIN, PANIC_TAP_WINDOW_DEFAULT_MS,
    STEALTH_TIMEOUT_MAX_MINUTES, STEALTH_TIMEOUT_MIN_MINUTES,
};
use crate::constants::{
    ALERT_RADIUS_DEFAULT_KM, CONFIG_FILE_PERMISSIONS, CONFIG_PERMISSION_MASK_GROUP_OTHER,
    PANIC_TAP_WINDOW_MAX_MS, PANIC_TAP_WINDOW_MIN_MS,
};
use crate::crypto;
use crate::platform::local::Contact;
use crate::platform::GeoPoint;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn default_panic_tap_count() -> u32 {
    PANIC_TAPS_DEFAULT
}

fn default_panic_tap_window_ms() -> u64 {
    PANIC_TAP_WINDOW_DEFAULT_MS
}

fn default_alert_radius_km() -> f64 {
    ALERT_RADIUS_DEFAULT_KM
}

/// Application configuration stored in config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Base64-encoded AES-256-GCM encrypted unlock code
    pub encrypted_unlock_code: String,
    /// Stealth auto-timeout in minutes
    pub stealth_timeout_minutes: u64,
    /// Taps that make up the panic gesture
    #[serde(default = "default_panic_tap_count")]
    pub panic_tap_count: u32,
    /// Longest gap between taps of one gesture, in milliseconds
    #[serde(default = "default_panic_tap_window_ms")]
    pub panic_tap_window_ms: u64,
    /// Radius for picking nearby contacts, in kilometres
    #[serde(default = "default_alert_radius_km")]
    pub alert_radius_km: f64,
    /// Where the local store and incident log live (default: platform data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Fixed location reported in panic mode (devices without GPS)
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl Config {
    /// Create a new config with an encrypted unlock code and default
    /// gesture settings
    pub fn new(plaintext_unlock_code: &str, stealth_timeout_minutes: u64) -> Result<Self> {
        if plaintext_unlock_code.trim().is_empty() {
            return Err(anyhow!("Unlock code cannot be empty"));
        }
        let encrypted_unlock_code = crypto::seal(plaintext_unlock_code.trim(), crypto::UNLOCK_CODE_CONTEXT)
            .context("Failed to encrypt unlock code")?;

        let config = Self {
            encrypted_unlock_code,
            stealth_timeout_minutes,
            panic_tap_count: PANIC_TAPS_DEFAULT,
            panic_tap_window_ms: PANIC_TAP_WINDOW_DEFAULT_MS,
            alert_radius_km: ALERT_RADIUS_DEFAULT_KM,
            data_dir: None,
            location: None,
            contacts: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Get the standard config file path
    ///
    /// - macOS: `~/Library/Application Support/guardian/config.toml`
    /// - Linux: `~/.config/guardian/config.toml`
    /// - Windows: `%APPDATA%\guardian\config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Failed to determine config directory"))?
            .join("guardian");

        Ok(config_dir.join("config.toml"))
    }

    /// Directory for the local store and incident log
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_local_dir()
                .ok_or_else(|| anyhow!("Failed to determine data directory"))?
                .join("guardian")),
        }
    }

    /// Load config from standard location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from_path(&path)
    }

    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Config file doesn't exist
    /// - Failed to read file
    /// - TOML parsing fails
    /// - A setting is out of range or contacts are malformed
    ///
    /// Permissive file permissions only produce a warning.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at: {}\n\nRun 'guardian --setup' to create it.",
                path.display()
            );
        }

        #[cfg(unix)]
        {
            let metadata = fs::metadata(path).context("Failed to read config file metadata")?;
            let mode = metadata.permissions().mode();

            if mode & CONFIG_PERMISSION_MASK_GROUP_OTHER != 0 {
                log::warn!(
                    "Config file has permissive permissions: {:o}. Should be 600 (user read/write only).",
                    mode & 0o777
                );
            }
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to standard location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to_path(&path)
    }

    /// Save config to a specific path
    ///
    /// Creates the parent directory if needed and sets file permissions to
    /// 600 (user read/write only).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        #[cfg(unix)]
        {
            let mut permissions = fs::metadata(path)?.permissions();
            permissions.set_mode(CONFIG_FILE_PERMISSIONS);
            fs::set_permissions(path, permissions)
                .context("Failed to set config file permissions")?;
        }

        log::info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Decrypt and return the plaintext unlock code
    pub fn get_unlock_code(&self) -> Result<String> {
        crypto::open(&self.encrypted_unlock_code, crypto::UNLOCK_CODE_CONTEXT)
            .context("Failed to decrypt unlock code")
    }

    /// Check every setting against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !(STEALTH_TIMEOUT_MIN_MINUTES..=STEALTH_TIMEOUT_MAX_MINUTES)
            .contains(&self.stealth_timeout_minutes)
        {
            anyhow::bail!(
                "stealth_timeout_minutes must be {}-{} (got {})",
                STEALTH_TIMEOUT_MIN_MINUTES,
                STEALTH_TIMEOUT_MAX_MINUTES,
                self.stealth_timeout_minutes
            );
        }
        if !(PANIC_TAPS_MIN..=PANIC_TAPS_MAX).contains(&self.panic_tap_count) {
            anyhow::bail!(
                "panic_tap_count must be {}-{} (got {})",
                PANIC_TAPS_MIN,
                PANIC_TAPS_MAX,
                self.panic_tap_count
            );
        }
        if !(PANIC_TAP_WINDOW_MIN_MS..=PANIC_TAP_WINDOW_MAX_MS).contains(&self.panic_tap_window_ms)
        {
            anyhow::bail!(
                "panic_tap_window_ms must be {}-{} (got {})",
                PANIC_TAP_WINDOW_MIN_MS,
                PANIC_TAP_WINDOW_MAX_MS,
                self.panic_tap_window_ms
            );
        }
        if !(self.alert_radius_km.is_finite() && self.alert_radius_km > 0.0) {
            anyhow::bail!(
                "alert_radius_km must be a positive number (got {})",
                self.alert_radius_km
            );
        }

        let mut seen = HashSet::new();
        for contact in &self.contacts {
            if contact.id.trim().is_empty() {
                anyhow::bail!("Contact ids cannot be empty");
            }
            if !seen.insert(contact.id.as_str()) {
                anyhow::bail!("Duplicate contact id: '{}'", contact.id);
            }
        }
        Ok(())
    }
}
