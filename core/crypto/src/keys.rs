//! Key material with secure memory handling.
//!
//! The symmetric key is derived deterministically from the database password
//! and lives only for the session. It zeroizes its memory on drop so the key
//! does not persist after the database is closed.

use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the symmetric key in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of an initialization vector in bytes (one AES block).
pub const IV_LENGTH: usize = 16;

/// Symmetric key for one database.
///
/// Derived from the password with a fixed one-way hash and used directly as
/// the AES-256 key. Never written to disk.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LENGTH],
}

impl CipherKey {
    /// Derive the key from a password.
    ///
    /// # Postconditions
    /// - Deterministic: the same password always yields the same key
    pub fn derive(password: &str) -> Self {
        let digest = Sha256::digest(password.as_bytes());
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

/// Generate a fresh random initialization vector.
pub fn generate_iv() -> [u8; IV_LENGTH] {
    use rand::RngCore;
    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
