//! Stealth unlock-code handling
//!
//! The disguise UI is left by typing the unlock code; only its SHA-256 hash
//! is kept in memory once the config has been decrypted.

use crate::utils;

/// Verify if an unlock code matches the stored hash
pub fn verify_unlock_code(input: &str, stored_hash: &str) -> bool {
    utils::verify_code(input.trim(), stored_hash)
}

/// Hash a new unlock code for in-memory comparison
pub fn hash_unlock_code(code: &str) -> String {
    utils::hash_code(code.trim())
}
