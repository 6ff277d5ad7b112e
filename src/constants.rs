//! Centralized constants for Guardian
//!
//! This module contains all configurable numerical values used throughout
//! the crate. Each constant includes documentation on its purpose,
//! unit, and recommended value range.

// ============================================================================
// PANIC GESTURE CONFIGURATION
// ============================================================================

/// Default number of taps that make up one panic gesture.
/// Unit: taps
/// Recommended range: 3-7 (fewer risks accidental triggers)
pub const PANIC_TAPS_DEFAULT: u32 = 5;

/// Minimum tap count accepted by the detector.
/// Unit: taps
/// Range: Fixed minimum, a single tap is never a gesture
pub const PANIC_TAPS_MIN: u32 = 2;

/// Maximum tap count accepted from configuration.
/// Unit: taps
/// Range: Fixed maximum, longer bursts are impractical under stress
pub const PANIC_TAPS_MAX: u32 = 10;

/// Default gap allowed between consecutive taps of one gesture.
/// Unit: milliseconds
/// Recommended range: 500-3000
pub const PANIC_TAP_WINDOW_DEFAULT_MS: u64 = 2000;

/// Minimum tap window accepted from configuration.
/// Unit: milliseconds
pub const PANIC_TAP_WINDOW_MIN_MS: u64 = 100;

/// Maximum tap window accepted from configuration.
/// Unit: milliseconds
pub const PANIC_TAP_WINDOW_MAX_MS: u64 = 10_000;

// ============================================================================
// STEALTH MODE CONFIGURATION
// ============================================================================

/// Minimum stealth auto-timeout.
/// Unit: minutes
pub const STEALTH_TIMEOUT_MIN_MINUTES: u64 = 1;

/// Maximum stealth auto-timeout.
/// Unit: minutes
/// Range: Fixed maximum (1 hour)
pub const STEALTH_TIMEOUT_MAX_MINUTES: u64 = 60;

/// Default stealth auto-timeout when no config exists.
/// Unit: minutes
/// Recommended range: 2-15
pub const STEALTH_TIMEOUT_DEFAULT_MINUTES: u64 = 5;

// ============================================================================
// PANIC SEQUENCE TIMING
// ============================================================================

/// Upper bound on the location fix attempted at the start of a panic run.
/// Unit: milliseconds
/// Recommended range: 3000-10000 (an alert without location beats no alert)
pub const LOCATION_TIMEOUT_MS: u64 = 5000;

/// Fixed wait for sign-out side effects when no navigation acknowledgment is wired.
/// Unit: milliseconds
pub const SETTLE_DELAY_MS: u64 = 1000;

/// Upper bound on waiting for an explicit navigation acknowledgment.
/// Unit: milliseconds
pub const SETTLE_TIMEOUT_MS: u64 = 3000;

/// Delay between the settled signed-out state and process termination.
/// Unit: milliseconds
pub const TERMINATE_DELAY_MS: u64 = 500;

// ============================================================================
// ALERT FAN-OUT
// ============================================================================

/// Default radius used to pick nearby recipients.
/// Unit: kilometres
/// Recommended range: 1-25
pub const ALERT_RADIUS_DEFAULT_KM: f64 = 5.0;

/// Maximum concurrent recipient sends during the alert fan-out.
/// Unit: in-flight requests
/// Recommended range: 10-20
pub const ALERT_FANOUT_CONCURRENCY: usize = 10;

/// Mean Earth radius used for distance filtering.
/// Unit: kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// ============================================================================
// FILE PERMISSIONS
// ============================================================================

/// Config and store file permissions (user read/write only for security).
/// Unit: Unix permission bits (octal)
pub const CONFIG_FILE_PERMISSIONS: u32 = 0o600;

/// Permission mask to check for group/other access (security check).
/// Unit: Unix permission bits (octal)
pub const CONFIG_PERMISSION_MASK_GROUP_OTHER: u32 = 0o077;

// ============================================================================
// CRYPTOGRAPHY
// ============================================================================

/// AES-256-GCM nonce length.
/// Unit: bytes
/// Range: Fixed at 12 bytes (96 bits) per GCM specification
pub const NONCE_LENGTH_BYTES: usize = 12;
