//! Manages the creation and verification of CertificateVerify signatures.
//!
//! This module centralizes the signed-content layout (RFC 8446 §4.4.3) so that
//! the client and server build byte-identical payloads.
//!
//! 管理 CertificateVerify 签名的创建和验证。
//!
//! 该模块集中了签名内容的格式（RFC 8446 §4.4.3），
//! 确保了客户端和服务器端构造的签名载荷完全一致。

use crate::crypto::suite::SignatureScheme;
use crate::error::{HandshakeError, Result};
use ed25519_dalek::{Signer as _, Verifier as _};
use std::fmt;

const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";
const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// Key algorithms a certificate may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    EcdsaP256,
}

impl KeyType {
    /// The one signature scheme this key type signs with.
    pub fn scheme(self) -> SignatureScheme {
        match self {
            KeyType::Ed25519 => SignatureScheme::Ed25519,
            KeyType::EcdsaP256 => SignatureScheme::EcdsaSecp256r1Sha256,
        }
    }
}

/// A private key used to sign CertificateVerify.
pub enum SigningKey {
    Ed25519(Box<ed25519_dalek::SigningKey>),
    EcdsaP256(Box<p256::ecdsa::SigningKey>),
}

impl SigningKey {
    /// Loads a PKCS#8 DER private key, trying Ed25519 then ECDSA P-256.
    ///
    /// 加载 PKCS#8 DER 私钥，依次尝试 Ed25519 与 ECDSA P-256。
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        use ed25519_dalek::pkcs8::DecodePrivateKey as _;
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_der(der) {
            return Ok(SigningKey::Ed25519(Box::new(key)));
        }
        use p256::pkcs8::DecodePrivateKey as _;
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(SigningKey::EcdsaP256(Box::new(key)));
        }
        Err(HandshakeError::Config("unsupported private key (expected Ed25519 or P-256 PKCS#8)"))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            SigningKey::Ed25519(_) => KeyType::Ed25519,
            SigningKey::EcdsaP256(_) => KeyType::EcdsaP256,
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.key_type().scheme()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKey::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            SigningKey::EcdsaP256(key) => {
                let signature: p256::ecdsa::Signature =
                    p256::ecdsa::signature::Signer::sign(key.as_ref(), message);
                signature.to_der().as_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.key_type()).finish()
    }
}

/// The public key extracted from a verified peer certificate.
///
/// Ed25519 keys are the raw 32 bytes; P-256 keys are SEC1 encoded points.
///
/// 从已验证的对端证书中提取的公钥。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPublicKey {
    pub key_type: KeyType,
    pub bytes: Vec<u8>,
}

/// Builds the content covered by a CertificateVerify signature:
/// 64 spaces, the context string, a zero byte, then the transcript hash.
pub fn certificate_verify_message(is_server: bool, transcript_hash: &[u8]) -> Vec<u8> {
    let context = if is_server {
        SERVER_CONTEXT
    } else {
        CLIENT_CONTEXT
    };
    let mut message = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    message.extend_from_slice(&[0x20; 64]);
    message.extend_from_slice(context);
    message.push(0);
    message.extend_from_slice(transcript_hash);
    message
}

/// Signs the transcript on behalf of the local endpoint.
///
/// 代表本端对握手记录签名。
pub fn sign_certificate_verify(
    key: &SigningKey,
    is_server: bool,
    transcript_hash: &[u8],
) -> Vec<u8> {
    key.sign(&certificate_verify_message(is_server, transcript_hash))
}

/// Verifies a peer's CertificateVerify. `is_server` names the signer.
///
/// The scheme must match the certificate's key type; every failure is
/// reported as [`HandshakeError::InvalidSignature`].
///
/// 验证对端的 CertificateVerify。`is_server` 表示签名方。
pub fn verify_certificate_verify(
    peer_key: &PeerPublicKey,
    scheme: SignatureScheme,
    is_server: bool,
    transcript_hash: &[u8],
    signature: &[u8],
) -> Result<()> {
    if peer_key.key_type.scheme() != scheme {
        return Err(HandshakeError::IllegalParameter("signature scheme does not match certificate key"));
    }
    let message = certificate_verify_message(is_server, transcript_hash);
    match peer_key.key_type {
        KeyType::Ed25519 => {
            let bytes: [u8; 32] = peer_key
                .bytes
                .as_slice()
                .try_into()
                .map_err(|_| HandshakeError::InvalidSignature)?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map_err(|_| HandshakeError::InvalidSignature)?;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|_| HandshakeError::InvalidSignature)?;
            key.verify(&message, &signature)
                .map_err(|_| HandshakeError::InvalidSignature)
        }
        KeyType::EcdsaP256 => {
            use p256::ecdsa::signature::Verifier as _;
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&peer_key.bytes)
                .map_err(|_| HandshakeError::InvalidSignature)?;
            let signature = p256::ecdsa::Signature::from_der(signature)
                .map_err(|_| HandshakeError::InvalidSignature)?;
            key.verify(&message, &signature)
                .map_err(|_| HandshakeError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn ed25519_pair() -> (SigningKey, PeerPublicKey) {
        let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let public = PeerPublicKey {
            key_type: KeyType::Ed25519,
            bytes: key.verifying_key().to_bytes().to_vec(),
        };
        (SigningKey::Ed25519(Box::new(key)), public)
    }

    fn p256_pair() -> (SigningKey, PeerPublicKey) {
        let key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let public = PeerPublicKey {
            key_type: KeyType::EcdsaP256,
            bytes: key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
        };
        (SigningKey::EcdsaP256(Box::new(key)), public)
    }

    #[test]
    fn signed_content_layout() {
        let message = certificate_verify_message(true, &[0xab; 32]);
        assert_eq!(&message[..64], &[0x20; 64]);
        assert_eq!(&message[64..64 + SERVER_CONTEXT.len()], SERVER_CONTEXT);
        assert_eq!(message[64 + SERVER_CONTEXT.len()], 0);
        assert_eq!(message.len(), 64 + SERVER_CONTEXT.len() + 1 + 32);
    }

    #[test]
    fn sign_and_verify_both_key_types() {
        let hash = [7u8; 32];
        for (key, public) in [ed25519_pair(), p256_pair()] {
            let signature = sign_certificate_verify(&key, true, &hash);
            verify_certificate_verify(&public, key.scheme(), true, &hash, &signature).unwrap();

            // Role separation: a server signature is not a client signature.
            assert!(matches!(
                verify_certificate_verify(&public, key.scheme(), false, &hash, &signature),
                Err(HandshakeError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn scheme_must_match_key() {
        let (key, public) = ed25519_pair();
        let signature = sign_certificate_verify(&key, false, &[1; 48]);
        assert!(
            verify_certificate_verify(
                &public,
                SignatureScheme::EcdsaSecp256r1Sha256,
                false,
                &[1; 48],
                &signature
            )
            .is_err()
        );
    }
}
