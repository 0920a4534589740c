//! Password hashing and verification.
//!
//! Salted, iterated SHA-256: a random 16-byte salt (stored hex-encoded next
//! to the digest) is appended to the password, the result is hashed, and the
//! digest is re-hashed until `ITERATIONS` rounds have run.

use rand::RngExt;
use sha2::{Digest, Sha256};

/// Salt length in raw bytes.
pub const SALT_LEN: usize = 16;

/// SHA-256 rounds per hash.
pub const ITERATIONS: u32 = 10_000;

/// Stored credential pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

/// Generate a fresh hex-encoded salt.
pub fn generate_salt() -> String {
    let bytes: [u8; SALT_LEN] = rand::rng().random();
    hex::encode(bytes)
}

/// Hash `password` with an existing salt.
pub fn hash_with_salt(password: &str, salt: &str) -> String {
    let mut digest = Sha256::digest(format!("{password}{salt}").as_bytes());
    for _ in 1..ITERATIONS {
        digest = Sha256::digest(digest.as_slice());
    }
    hex::encode(digest)
}

/// Hash a password with a freshly generated salt.
pub fn hash_password(password: &str) -> HashedPassword {
    let salt = generate_salt();
    let hash = hash_with_salt(password, &salt);
    HashedPassword { hash, salt }
}

/// Verify a password against a stored hash and salt.
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    constant_time_eq::constant_time_eq(hash_with_salt(password, salt).as_bytes(), hash.as_bytes())
}
