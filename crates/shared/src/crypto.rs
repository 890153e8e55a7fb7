//! Hashing utilities for caller fingerprints.
//!
//! Raw client addresses never leave the request boundary; only the keyed
//! digest produced here is stored in the usage ledger.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes a client IP address with HMAC-SHA256 keyed by `secret`.
///
/// The output is a 64 character lowercase hex string. The same address and
/// secret always produce the same digest, which is what allows contribution
/// attribution by "most recent usage from this hash".
pub fn hash_ip(ip: &str, secret: &str) -> String {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(ip),
    };
    mac.update(ip.trim().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Generates a random alphanumeric secret of the given length.
pub fn random_secret(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();

    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
