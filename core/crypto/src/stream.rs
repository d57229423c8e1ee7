//! Streaming encryption for binary attachments.
//!
//! This module provides chunk-based AES-256-CBC so attachments do not have to
//! fit in one cipher call. Partial blocks carry over between chunks; PKCS#7
//! padding is applied only to the final block, and the decryptor holds the
//! final ciphertext block back until end of stream to strip it.

use std::io::{Read, Write};

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};

use crate::keys::{CipherKey, IV_LENGTH};
use curio_common::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Chunk size for streaming (64 KiB, a multiple of the block size).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Encrypt data from `reader` and write the cipher body to `writer`.
///
/// The IV is not written; callers prepend it themselves (attachment files
/// carry it as a 16-byte prefix).
///
/// # Postconditions
/// - The cipher body length is a positive multiple of the block size
///   (a full padding block is appended even when the input length is aligned)
///
/// # Errors
/// - I/O errors from reader/writer
pub fn encrypt_stream<R: Read, W: Write>(
    key: &CipherKey,
    iv: &[u8; IV_LENGTH],
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let mut enc = Aes256CbcEnc::new(key.as_bytes().into(), iv.into());
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0usize;
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;

        let full = filled - filled % BLOCK_SIZE;
        if full > 0 {
            for block in buf[..full].chunks_exact_mut(BLOCK_SIZE) {
                enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            writer.write_all(&buf[..full])?;
            written += full as u64;
            buf.copy_within(full..filled, 0);
            filled -= full;
        }
    }

    // Final block: the remaining partial data (possibly empty) plus padding.
    let mut last = [0u8; BLOCK_SIZE];
    last[..filled].copy_from_slice(&buf[..filled]);
    let ciphertext = enc
        .encrypt_padded_mut::<Pkcs7>(&mut last, filled)
        .map_err(|_| Error::Decrypt("block padding failed".to_string()))?;
    writer.write_all(ciphertext)?;
    written += ciphertext.len() as u64;

    Ok(written)
}

/// Decrypt a cipher body from `reader` and write the plaintext to `writer`.
///
/// # Preconditions
/// - `reader` yields the cipher body only (IV already consumed by the caller)
///
/// # Errors
/// - `Decrypt` if the body length is not a positive multiple of the block
///   size, or if the final block carries invalid padding
/// - I/O errors from reader/writer
pub fn decrypt_stream<R: Read, W: Write>(
    key: &CipherKey,
    iv: &[u8; IV_LENGTH],
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let mut dec = Aes256CbcDec::new(key.as_bytes().into(), iv.into());
    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);

        // Decrypt everything except the trailing block, which may hold the
        // padding and must wait for end of stream.
        if pending.len() > BLOCK_SIZE {
            let ready = (pending.len() - BLOCK_SIZE) / BLOCK_SIZE * BLOCK_SIZE;
            if ready > 0 {
                for block in pending[..ready].chunks_exact_mut(BLOCK_SIZE) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
                writer.write_all(&pending[..ready])?;
                written += ready as u64;
                pending.drain(..ready);
            }
        }
    }

    if pending.len() != BLOCK_SIZE {
        return Err(Error::Decrypt(format!(
            "cipher body is not block aligned (trailing {} bytes)",
            pending.len()
        )));
    }

    let mut last = [0u8; BLOCK_SIZE];
    last.copy_from_slice(&pending);
    let plaintext = dec
        .decrypt_padded_mut::<Pkcs7>(&mut last)
        .map_err(|_| Error::Decrypt("invalid padding".to_string()))?;
    writer.write_all(plaintext)?;
    written += plaintext.len() as u64;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_iv;

    fn roundtrip(data: &[u8]) -> Vec<u8> {
        let key = CipherKey::derive("stream-test");
        let iv = generate_iv();

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, &iv, data, &mut ciphertext).unwrap();

        let mut plaintext = Vec::new();
        decrypt_stream(&key, &iv, ciphertext.as_slice(), &mut plaintext).unwrap();
        plaintext
    }

    #[test]
    fn test_roundtrip_small() {
        let data = b"hello attachment";
        assert_eq!(roundtrip(data), data);
    }

    #[test]
    fn test_roundtrip_empty() {
        assert_eq!(roundtrip(b""), b"");
    }

    #[test]
    fn test_roundtrip_block_aligned() {
        let data = vec![0xCD; BLOCK_SIZE * 4];
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn test_roundtrip_multiple_chunks() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 7).map(|i| (i % 251) as u8).collect();
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn test_ciphertext_length_padded() {
        let key = CipherKey::derive("k");
        let iv = generate_iv();

        for len in [0usize, 1, 15, 16, 17, 32, 1000] {
            let data = vec![0u8; len];
            let mut ct = Vec::new();
            encrypt_stream(&key, &iv, data.as_slice(), &mut ct).unwrap();
            assert_eq!(ct.len(), (len / BLOCK_SIZE + 1) * BLOCK_SIZE, "len={len}");
        }
    }

    #[test]
    fn test_unaligned_body_fails() {
        let key = CipherKey::derive("k");
        let iv = generate_iv();
        let mut out = Vec::new();
        let result = decrypt_stream(&key, &iv, &[0u8; 21][..], &mut out);
        assert!(matches!(result, Err(Error::Decrypt(_))));
    }

    #[test]
    fn test_empty_body_fails() {
        let key = CipherKey::derive("k");
        let iv = generate_iv();
        let mut out = Vec::new();
        let result = decrypt_stream(&key, &iv, &[][..], &mut out);
        assert!(matches!(result, Err(Error::Decrypt(_))));
    }

    #[test]
    fn test_wrong_key_does_not_yield_plaintext() {
        let iv = generate_iv();
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut ct = Vec::new();
        encrypt_stream(&CipherKey::derive("right"), &iv, &data[..], &mut ct).unwrap();

        let mut out = Vec::new();
        match decrypt_stream(&CipherKey::derive("wrong"), &iv, ct.as_slice(), &mut out) {
            // CBC under a wrong key can still unpad by chance; the bytes must
            // nevertheless differ from the original plaintext.
            Ok(_) => assert_ne!(out, data),
            Err(_) => {}
        }
    }
}
