//! Environment variable overrides for Guardian
//!
//! The primary configuration source is the config.toml file (see
//! config_file module). These variables can optionally override it.
//!
//! Environment variables (all optional):
//! - GUARDIAN_STEALTH_TIMEOUT: Override stealth auto-timeout (minutes)
//! - GUARDIAN_PANIC_TAPS: Override the number of taps in the panic gesture

use crate::app_state::{
    PANIC_TAPS_MAX, PANIC_TAPS_MIN, STEALTH_TIMEOUT_MAX_MINUTES, STEALTH_TIMEOUT_MIN_MINUTES,
};
use log::{debug, info, warn};
use std::env;

pub const STEALTH_TIMEOUT_VAR: &str = "GUARDIAN_STEALTH_TIMEOUT";
pub const PANIC_TAPS_VAR: &str = "GUARDIAN_PANIC_TAPS";

/// Parse the GUARDIAN_STEALTH_TIMEOUT environment variable
///
/// Returns Some(minutes) if a valid timeout is configured (1-60 minutes)
/// Returns None if not set or invalid
pub fn parse_stealth_timeout() -> Option<u64> {
    parse_stealth_timeout_value(env::var(STEALTH_TIMEOUT_VAR).ok().as_deref())
}

pub fn parse_stealth_timeout_value(value: Option<&str>) -> Option<u64> {
    let Some(val) = value else {
        debug!("{} not set.", STEALTH_TIMEOUT_VAR);
        return None;
    };
    match val.parse::<u64>() {
        Ok(minutes)
            if (STEALTH_TIMEOUT_MIN_MINUTES..=STEALTH_TIMEOUT_MAX_MINUTES).contains(&minutes) =>
        {
            info!(
                "Stealth auto-timeout set via environment variable: {} minutes",
                minutes
            );
            Some(minutes)
        }
        Ok(minutes) => {
            warn!(
                "Invalid stealth timeout: {} (must be {}-{} minutes). Using config file.",
                minutes, STEALTH_TIMEOUT_MIN_MINUTES, STEALTH_TIMEOUT_MAX_MINUTES
            );
            None
        }
        Err(e) => {
            warn!(
                "Failed to parse {}: {}. Using config file.",
                STEALTH_TIMEOUT_VAR, e
            );
            None
        }
    }
}

/// Parse the GUARDIAN_PANIC_TAPS environment variable
///
/// Returns Some(count) if a valid tap count is configured (2-10)
/// Returns None if not set or invalid
pub fn parse_panic_taps() -> Option<u32> {
    parse_panic_taps_value(env::var(PANIC_TAPS_VAR).ok().as_deref())
}

pub fn parse_panic_taps_value(value: Option<&str>) -> Option<u32> {
    let Some(val) = value else {
        debug!("{} not set.", PANIC_TAPS_VAR);
        return None;
    };
    match val.parse::<u32>() {
        Ok(taps) if (PANIC_TAPS_MIN..=PANIC_TAPS_MAX).contains(&taps) => {
            info!("Panic gesture set via environment variable: {} taps", taps);
            Some(taps)
        }
        Ok(taps) => {
            warn!(
                "Invalid panic tap count: {} (must be {}-{}). Using config file.",
                taps, PANIC_TAPS_MIN, PANIC_TAPS_MAX
            );
            None
        }
        Err(e) => {
            warn!("Failed to parse {}: {}. Using config file.", PANIC_TAPS_VAR, e);
            None
        }
    }
}
