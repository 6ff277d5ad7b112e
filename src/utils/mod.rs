use ring::digest;

/// Hash a stealth unlock code using SHA-256
pub fn hash_code(code: &str) -> String {
    let hash = digest::digest(&digest::SHA256, code.as_bytes());
    hex::encode(hash.as_ref())
}

/// Verify an unlock code against a stored hash
pub fn verify_code(code: &str, hash: &str) -> bool {
    hash_code(code) == hash
}
