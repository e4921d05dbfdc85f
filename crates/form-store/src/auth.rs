//! Password gate for the editor.
//!
//! The configuration stores the lowercase hex SHA-256 digest of the editor
//! password; plaintext never leaves the process.

use sha2::{Digest, Sha256};

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compares the digest of `password` with `stored_hash` in constant time.
/// An empty stored hash never matches.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let stored = stored_hash.trim().to_ascii_lowercase();
    if stored.is_empty() {
        return false;
    }
    constant_time_eq(hash_password(password).as_bytes(), stored.as_bytes())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
