//! Hash, HMAC and HKDF primitives for the two TLS 1.3 hash functions.
//!
//! TLS 1.3 两种哈希函数的哈希、HMAC 与 HKDF 原语。

use crate::error::{HandshakeError, Result};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    /// Digest length in bytes (32 or 48).
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        }
    }

    /// A fresh running hash.
    pub fn context(self) -> HashContext {
        match self {
            HashAlgorithm::Sha256 => HashContext::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => HashContext::Sha384(Sha384::new()),
        }
    }

    pub fn hmac(self, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        match self {
            HashAlgorithm::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|_| HandshakeError::Crypto("hmac key"))?;
                mac.update(message);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(key)
                    .map_err(|_| HandshakeError::Crypto("hmac key"))?;
                mac.update(message);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    /// HKDF-Extract(salt, ikm) -> PRK.
    pub fn hkdf_extract(self, salt: &[u8], ikm: &[u8]) -> Zeroizing<Vec<u8>> {
        match self {
            HashAlgorithm::Sha256 => {
                Zeroizing::new(Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec())
            }
            HashAlgorithm::Sha384 => {
                Zeroizing::new(Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec())
            }
        }
    }

    /// HKDF-Expand(prk, info, len). Fails when `len > 255 * output_len`.
    pub fn hkdf_expand(self, prk: &[u8], info: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        if len > 255 * self.output_len() {
            return Err(HandshakeError::InvalidLength(len));
        }
        let mut okm = Zeroizing::new(vec![0u8; len]);
        match self {
            HashAlgorithm::Sha256 => Hkdf::<Sha256>::from_prk(prk)
                .map_err(|_| HandshakeError::Crypto("hkdf prk too short"))?
                .expand(info, &mut okm)
                .map_err(|_| HandshakeError::InvalidLength(len))?,
            HashAlgorithm::Sha384 => Hkdf::<Sha384>::from_prk(prk)
                .map_err(|_| HandshakeError::Crypto("hkdf prk too short"))?
                .expand(info, &mut okm)
                .map_err(|_| HandshakeError::InvalidLength(len))?,
        }
        Ok(okm)
    }
}

/// A running hash whose intermediate value can be read without consuming it.
#[derive(Debug, Clone)]
pub enum HashContext {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl HashContext {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashContext::Sha256(h) => h.update(data),
            HashContext::Sha384(h) => h.update(data),
        }
    }

    /// The digest of everything absorbed so far.
    pub fn current(&self) -> Vec<u8> {
        match self {
            HashContext::Sha256(h) => h.clone().finalize().to_vec(),
            HashContext::Sha384(h) => h.clone().finalize().to_vec(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            HashContext::Sha256(_) => HashAlgorithm::Sha256,
            HashContext::Sha384(_) => HashAlgorithm::Sha384,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_matches_known_value() {
        let empty = HashAlgorithm::Sha256.digest(b"");
        assert_eq!(empty[..4], [0xe3, 0xb0, 0xc4, 0x42]);
        assert_eq!(HashAlgorithm::Sha384.digest(b"").len(), 48);
    }

    #[test]
    fn running_hash_matches_one_shot() {
        let mut ctx = HashAlgorithm::Sha384.context();
        ctx.update(b"hello ");
        let partial = ctx.current();
        ctx.update(b"world");
        assert_eq!(partial, HashAlgorithm::Sha384.digest(b"hello "));
        assert_eq!(ctx.current(), HashAlgorithm::Sha384.digest(b"hello world"));
    }

    #[test]
    fn hkdf_expand_enforces_limit() {
        let prk = HashAlgorithm::Sha256.hkdf_extract(&[], &[0u8; 32]);
        assert!(HashAlgorithm::Sha256.hkdf_expand(&prk, b"", 255 * 32).is_ok());
        assert!(matches!(
            HashAlgorithm::Sha256.hkdf_expand(&prk, b"", 255 * 32 + 1),
            Err(HandshakeError::InvalidLength(_))
        ));
    }
}
