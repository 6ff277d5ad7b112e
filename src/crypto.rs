//! Secret sealing using AES-256-GCM
//!
//! Every sealed value is bound to a context string passed as associated
//! data: the unlock code seals under [`UNLOCK_CODE_CONTEXT`], store values
//! under their store key. A value copied to another context fails to open.

use crate::constants::NONCE_LENGTH_BYTES;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

/// Static seed for key derivation (consistent across all builds/versions)
///
/// Keeps config and store files readable across versions of the app.
const KEY_SEED: &str = "com.guardian.safety.local.encryption.v1";

/// Context for the unlock code in the config file
pub const UNLOCK_CODE_CONTEXT: &str = "config/unlock_code";

fn cipher() -> Aes256Gcm {
    let key: [u8; 32] = Sha256::digest(KEY_SEED.as_bytes()).into();
    Aes256Gcm::new(&key.into())
}

/// Seal `plaintext` for `context`.
///
/// Returns base64 of: nonce (12 bytes) || ciphertext || auth tag
pub fn seal(plaintext: &str, context: &str) -> Result<String> {
    let mut sealed = vec![0u8; NONCE_LENGTH_BYTES];
    getrandom::getrandom(&mut sealed)
        .map_err(|e| anyhow::anyhow!("Failed to generate random nonce: {:?}", e))?;

    let payload = Payload {
        msg: plaintext.as_bytes(),
        aad: context.as_bytes(),
    };
    let ciphertext = cipher()
        .encrypt(Nonce::from_slice(&sealed), payload)
        .map_err(|e| anyhow::anyhow!("Sealing for '{}' failed: {}", context, e))?;
    sealed.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&sealed))
}

/// Open a value produced by [`seal`] with the same `context`.
///
/// Fails on bad base64, data too short to hold a nonce, or a failed
/// authentication (tampered data or a different context).
pub fn open(sealed: &str, context: &str) -> Result<String> {
    let data = BASE64.decode(sealed).context("Failed to decode base64")?;
    if data.len() < NONCE_LENGTH_BYTES {
        anyhow::bail!("Invalid sealed data: too short");
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LENGTH_BYTES);

    let payload = Payload {
        msg: ciphertext,
        aad: context.as_bytes(),
    };
    let plaintext = cipher()
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| anyhow::anyhow!("Opening for '{}' failed: {}", context, e))?;

    String::from_utf8(plaintext).context("Invalid UTF-8 in opened data")
}
