//! Per-database encryption engine.
//!
//! One engine wraps one [`CipherKey`] and provides the two shapes of
//! encrypted data a database holds: hex-encoded text envelopes (records,
//! settings) and IV-prefixed binary files (attachments).

use std::path::Path;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tokio::fs;
use tracing::debug;

use crate::envelope::{TextEnvelope, ENVELOPE_VERSION};
use crate::keys::{generate_iv, CipherKey, IV_LENGTH};
use crate::stream;
use curio_common::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric encryption engine for one database.
#[derive(Debug, Clone)]
pub struct CryptoEngine {
    key: CipherKey,
}

impl CryptoEngine {
    /// Create an engine from an existing key.
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    /// Create an engine for a password.
    pub fn from_password(password: &str) -> Self {
        Self::new(CipherKey::derive(password))
    }

    /// Get the engine key.
    pub fn key(&self) -> &CipherKey {
        &self.key
    }

    /// Encrypt a text value into its envelope JSON.
    ///
    /// # Postconditions
    /// - A fresh random IV is used for every call
    pub fn encrypt_text(&self, plaintext: &str) -> Result<String> {
        let iv = generate_iv();
        let ciphertext = Aes256CbcEnc::new(self.key.as_bytes().into(), (&iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        TextEnvelope {
            v: ENVELOPE_VERSION,
            iv: hex::encode(iv),
            data: hex::encode(ciphertext),
        }
        .to_json()
    }

    /// Decrypt an envelope JSON back into its text value.
    ///
    /// CBC decryption under a wrong key can occasionally yield padding that
    /// still validates, so callers must apply an independent structural check
    /// (expect valid JSON) rather than trust decrypt success alone.
    ///
    /// # Errors
    /// - `Decrypt` on a malformed envelope, unsupported version, bad hex,
    ///   invalid padding, or non-UTF-8 plaintext
    pub fn decrypt_text(&self, envelope: &str) -> Result<String> {
        let envelope = TextEnvelope::parse(envelope)?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(Error::Decrypt(format!(
                "unsupported envelope version {}",
                envelope.v
            )));
        }

        let iv = hex::decode(&envelope.iv)
            .map_err(|e| Error::Decrypt(format!("invalid iv encoding: {e}")))?;
        let iv: [u8; IV_LENGTH] = iv
            .try_into()
            .map_err(|_| Error::Decrypt("iv is not 16 bytes".to_string()))?;
        let ciphertext = hex::decode(&envelope.data)
            .map_err(|e| Error::Decrypt(format!("invalid data encoding: {e}")))?;

        let plaintext = Aes256CbcDec::new(self.key.as_bytes().into(), (&iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| Error::Decrypt("invalid padding".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decrypt("plaintext is not valid UTF-8".to_string()))
    }

    /// Encrypt a binary buffer into the attachment format: a 16-byte random
    /// IV prefix followed by the cipher body.
    pub fn encrypt_buffer(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let iv = generate_iv();
        let mut out = Vec::with_capacity(IV_LENGTH + bytes.len() + stream::BLOCK_SIZE);
        out.extend_from_slice(&iv);
        stream::encrypt_stream(&self.key, &iv, bytes, &mut out)?;
        Ok(out)
    }

    /// Decrypt a buffer in the attachment format.
    ///
    /// # Errors
    /// - `Io` if the buffer is shorter than the 16-byte IV prefix
    /// - `Decrypt` if the cipher body is malformed
    pub fn decrypt_buffer(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_LENGTH {
            return Err(Error::io_message(format!(
                "buffer too short for IV prefix ({} bytes)",
                data.len()
            )));
        }
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&data[..IV_LENGTH]);

        let mut out = Vec::with_capacity(data.len());
        stream::decrypt_stream(&self.key, &iv, &data[IV_LENGTH..], &mut out)?;
        Ok(out)
    }

    /// Encrypt a buffer and write it to `path`.
    ///
    /// The data is written to a temporary sibling file and renamed into
    /// place, so a failure never leaves a partial file at `path`.
    pub async fn save_buffer(&self, bytes: &[u8], path: &Path) -> Result<()> {
        let encrypted = self.encrypt_buffer(bytes)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = std::path::PathBuf::from(tmp);

        if let Err(e) = fs::write(&tmp, &encrypted).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), size = bytes.len(), "Encrypted buffer saved");
        Ok(())
    }

    /// Read and decrypt a file written by [`save_buffer`](Self::save_buffer).
    ///
    /// # Errors
    /// - `Io` if the file is missing or shorter than the 16-byte IV prefix
    /// - `Decrypt` if the cipher body is malformed
    pub async fn read_buffer(&self, path: &Path) -> Result<Vec<u8>> {
        let data = fs::read(path).await?;
        if data.len() < IV_LENGTH {
            return Err(Error::io_message(format!(
                "{}: file shorter than IV prefix ({} bytes)",
                path.display(),
                data.len()
            )));
        }
        self.decrypt_buffer(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_text_roundtrip() {
        let engine = CryptoEngine::from_password("secret");
        let plaintext = r#"{"name":"Example","rating":4}"#;

        let envelope = engine.encrypt_text(plaintext).unwrap();
        assert_ne!(envelope, plaintext);
        assert_eq!(engine.decrypt_text(&envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_envelope_shape() {
        let engine = CryptoEngine::from_password("secret");
        let envelope = engine.encrypt_text("hello").unwrap();

        let parsed = TextEnvelope::parse(&envelope).unwrap();
        assert_eq!(parsed.v, ENVELOPE_VERSION);
        assert_eq!(hex::decode(&parsed.iv).unwrap().len(), IV_LENGTH);
        // "hello" pads to a single block.
        assert_eq!(hex::decode(&parsed.data).unwrap().len(), 16);
    }

    #[test]
    fn test_fresh_iv_every_call() {
        let engine = CryptoEngine::from_password("secret");
        let a = engine.encrypt_text("same input").unwrap();
        let b = engine.encrypt_text("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_does_not_yield_plaintext() {
        let engine = CryptoEngine::from_password("right");
        let other = CryptoEngine::from_password("wrong");
        let plaintext = r#"{"kind":"record"}"#;

        let envelope = engine.encrypt_text(plaintext).unwrap();
        match other.decrypt_text(&envelope) {
            Ok(recovered) => assert_ne!(recovered, plaintext),
            Err(_) => {}
        }
    }

    #[test]
    fn test_decrypt_malformed_envelope() {
        let engine = CryptoEngine::from_password("secret");
        assert!(matches!(
            engine.decrypt_text("not an envelope"),
            Err(Error::Decrypt(_))
        ));
        assert!(matches!(
            engine.decrypt_text(r#"{"iv":"zz","data":"zz"}"#),
            Err(Error::Decrypt(_))
        ));
    }

    #[test]
    fn test_buffer_roundtrip_and_layout() {
        let engine = CryptoEngine::from_password("secret");
        let data = vec![7u8; 1000];

        let encrypted = engine.encrypt_buffer(&data).unwrap();
        // 16-byte IV prefix plus padded cipher body.
        assert_eq!(encrypted.len(), IV_LENGTH + (1000 / 16 + 1) * 16);
        assert_eq!(engine.decrypt_buffer(&encrypted).unwrap(), data);
    }

    #[test]
    fn test_decrypt_buffer_too_short() {
        let engine = CryptoEngine::from_password("secret");
        assert!(matches!(
            engine.decrypt_buffer(&[1, 2, 3]),
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_read_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0_screen.jpg.enc");
        let engine = CryptoEngine::from_password("secret");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();

        engine.save_buffer(&data, &path).await.unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), IV_LENGTH + (data.len() / 16 + 1) * 16);

        assert_eq!(engine.read_buffer(&path).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_read_buffer_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CryptoEngine::from_password("secret");
        let result = engine.read_buffer(&dir.path().join("absent.enc")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_buffer_shorter_than_iv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.enc");
        std::fs::write(&path, [0u8; 7]).unwrap();

        let engine = CryptoEngine::from_password("secret");
        assert!(matches!(
            engine.read_buffer(&path).await,
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_save_buffer_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("file.enc");
        let engine = CryptoEngine::from_password("secret");

        assert!(engine.save_buffer(b"data", &path).await.is_err());
        assert!(!path.exists());
    }

    proptest! {
        #[test]
        fn prop_text_roundtrip(plaintext in ".*") {
            let engine = CryptoEngine::from_password("prop");
            let envelope = engine.encrypt_text(&plaintext).unwrap();
            prop_assert_eq!(engine.decrypt_text(&envelope).unwrap(), plaintext);
        }

        #[test]
        fn prop_buffer_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let engine = CryptoEngine::from_password("prop");
            let encrypted = engine.encrypt_buffer(&data).unwrap();
            prop_assert_eq!(engine.decrypt_buffer(&encrypted).unwrap(), data);
        }
    }
}
