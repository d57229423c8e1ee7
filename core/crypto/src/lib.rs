//! Cryptographic primitives for Curio.
//!
//! This module provides:
//! - Key derivation (fixed SHA-256 digest of the database password)
//! - Text envelopes (AES-256-CBC, hex-encoded `{v, iv, data}` JSON)
//! - IV-prefixed streaming encryption for binary attachments
//! - Secure key management with automatic zeroization
//!
//! # Security notes
//! - Key material is zeroized on drop and never logged
//! - CBC carries no authentication tag; a decrypt that succeeds under a wrong
//!   key is possible, so callers pair decryption with a structural check

pub mod engine;
pub mod envelope;
pub mod keys;
pub mod stream;

pub use engine::CryptoEngine;
pub use envelope::{TextEnvelope, ENVELOPE_VERSION};
pub use keys::{generate_iv, CipherKey, IV_LENGTH, KEY_LENGTH};
