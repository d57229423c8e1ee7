//! Text envelope carried by every encrypted text value.
//!
//! One envelope is a small JSON object `{v, iv, data}` with the IV and the
//! ciphertext hex-encoded. The `v` field is a schema version; envelopes
//! written before the field existed deserialize as version 1. A string that
//! does not parse as an envelope at all is legacy plaintext, which keeps
//! legacy data distinguishable from corruption (a well-formed envelope that
//! fails to decrypt).

use serde::{Deserialize, Serialize};

use curio_common::{Error, Result};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u8 = 1;

fn default_version() -> u8 {
    ENVELOPE_VERSION
}

/// Envelope for one encrypted text value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEnvelope {
    /// Schema version.
    #[serde(default = "default_version")]
    pub v: u8,
    /// Initialization vector, hex-encoded (16 bytes).
    pub iv: String,
    /// Ciphertext, hex-encoded.
    pub data: String,
}

impl TextEnvelope {
    /// Parse an envelope from its JSON form.
    ///
    /// # Errors
    /// - `Decrypt` if the text is not a well-formed envelope
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Decrypt(format!("malformed envelope: {e}")))
    }

    /// Check whether a string is a well-formed envelope.
    pub fn is_envelope(text: &str) -> bool {
        Self::parse(text).is_ok()
    }

    /// Serialize to the on-disk JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}
