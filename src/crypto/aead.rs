//! AEAD primitives behind one tagged type.
//!
//! 以单一标签类型封装的 AEAD 原语。

use crate::crypto::suite::AeadAlgorithm;
use crate::error::{HandshakeError, Result};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use std::fmt;

pub const TAG_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

/// A keyed AEAD instance. The key schedule of the underlying cipher lives
/// inside the variant and is dropped with it.
pub enum AeadCipher {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

impl AeadCipher {
    pub fn new(algorithm: AeadAlgorithm, key: &[u8]) -> Result<Self> {
        if key.len() != algorithm.key_len() {
            return Err(HandshakeError::InvalidLength(key.len()));
        }
        let bad_key = |_| HandshakeError::Crypto("aead key");
        Ok(match algorithm {
            AeadAlgorithm::Aes128Gcm => {
                AeadCipher::Aes128Gcm(Box::new(Aes128Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::Aes256Gcm => {
                AeadCipher::Aes256Gcm(Box::new(Aes256Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::ChaCha20Poly1305 => AeadCipher::ChaCha20Poly1305(Box::new(
                ChaCha20Poly1305::new_from_slice(key).map_err(bad_key)?,
            )),
        })
    }

    pub fn algorithm(&self) -> AeadAlgorithm {
        match self {
            AeadCipher::Aes128Gcm(_) => AeadAlgorithm::Aes128Gcm,
            AeadCipher::Aes256Gcm(_) => AeadAlgorithm::Aes256Gcm,
            AeadCipher::ChaCha20Poly1305(_) => AeadAlgorithm::ChaCha20Poly1305,
        }
    }

    /// Encrypts `buffer` in place and returns the detached tag.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_LEN]> {
        let seal_failed = |_| HandshakeError::Crypto("aead seal");
        let tag = match self {
            AeadCipher::Aes128Gcm(c) => c
                .encrypt_in_place_detached(aes_gcm::Nonce::from_slice(nonce), aad, buffer)
                .map_err(seal_failed)?,
            AeadCipher::Aes256Gcm(c) => c
                .encrypt_in_place_detached(aes_gcm::Nonce::from_slice(nonce), aad, buffer)
                .map_err(seal_failed)?,
            AeadCipher::ChaCha20Poly1305(c) => c
                .encrypt_in_place_detached(chacha20poly1305::Nonce::from_slice(nonce), aad, buffer)
                .map_err(seal_failed)?,
        };
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Decrypts `buffer` in place after checking `tag`.
    ///
    /// Any failure is reported as [`HandshakeError::BadRecordMac`] with no
    /// further detail.
    pub fn open_in_place(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        if tag.len() != TAG_LEN {
            return Err(HandshakeError::BadRecordMac);
        }
        let result = match self {
            AeadCipher::Aes128Gcm(c) => c.decrypt_in_place_detached(
                aes_gcm::Nonce::from_slice(nonce),
                aad,
                buffer,
                aes_gcm::Tag::from_slice(tag),
            ),
            AeadCipher::Aes256Gcm(c) => c.decrypt_in_place_detached(
                aes_gcm::Nonce::from_slice(nonce),
                aad,
                buffer,
                aes_gcm::Tag::from_slice(tag),
            ),
            AeadCipher::ChaCha20Poly1305(c) => c.decrypt_in_place_detached(
                chacha20poly1305::Nonce::from_slice(nonce),
                aad,
                buffer,
                chacha20poly1305::Tag::from_slice(tag),
            ),
        };
        result.map_err(|_| HandshakeError::BadRecordMac)
    }
}

impl fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AeadCipher").field(&self.algorithm()).finish()
    }
}
