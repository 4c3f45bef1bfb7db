//! Algorithm identifiers and the negotiable [`ProtocolSuite`].
//!
//! 算法标识符与可协商的 [`ProtocolSuite`]。

use crate::crypto::hash::HashAlgorithm;
use crate::error::{HandshakeError, Result};
use serde::{Deserialize, Serialize};

/// TLS 1.3 cipher suites (RFC 8446 §B.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherSuite {
    TlsAes128GcmSha256,
    TlsAes256GcmSha384,
    TlsChaCha20Poly1305Sha256,
    Unknown(u16),
}

/// The AEAD half of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn key_len(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm | AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 3] = [
        CipherSuite::TlsAes128GcmSha256,
        CipherSuite::TlsAes256GcmSha384,
        CipherSuite::TlsChaCha20Poly1305Sha256,
    ];

    pub fn from_u16(value: u16) -> Self {
        match value {
            0x1301 => CipherSuite::TlsAes128GcmSha256,
            0x1302 => CipherSuite::TlsAes256GcmSha384,
            0x1303 => CipherSuite::TlsChaCha20Poly1305Sha256,
            other => CipherSuite::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            CipherSuite::TlsAes128GcmSha256 => 0x1301,
            CipherSuite::TlsAes256GcmSha384 => 0x1302,
            CipherSuite::TlsChaCha20Poly1305Sha256 => 0x1303,
            CipherSuite::Unknown(other) => other,
        }
    }

    /// The hash that drives HKDF and the transcript for this suite.
    pub fn hash(self) -> Result<HashAlgorithm> {
        match self {
            CipherSuite::TlsAes128GcmSha256 | CipherSuite::TlsChaCha20Poly1305Sha256 => {
                Ok(HashAlgorithm::Sha256)
            }
            CipherSuite::TlsAes256GcmSha384 => Ok(HashAlgorithm::Sha384),
            CipherSuite::Unknown(_) => Err(HandshakeError::HandshakeFailure("unknown cipher suite")),
        }
    }

    pub fn aead(self) -> Result<AeadAlgorithm> {
        match self {
            CipherSuite::TlsAes128GcmSha256 => Ok(AeadAlgorithm::Aes128Gcm),
            CipherSuite::TlsAes256GcmSha384 => Ok(AeadAlgorithm::Aes256Gcm),
            CipherSuite::TlsChaCha20Poly1305Sha256 => Ok(AeadAlgorithm::ChaCha20Poly1305),
            CipherSuite::Unknown(_) => Err(HandshakeError::HandshakeFailure("unknown cipher suite")),
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }
}

/// Key exchange groups.
///
/// `X25519MlKem768` is the hybrid group: an ML-KEM-768 encapsulation combined
/// with an X25519 exchange, whose shared secret is the 64-byte concatenation
/// of both.
///
/// 密钥交换组。
///
/// `X25519MlKem768` 是混合组：ML-KEM-768 封装与 X25519 交换相结合，
/// 共享密钥是两者拼接而成的 64 字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedGroup {
    X25519,
    X25519MlKem768,
    Unknown(u16),
}

impl NamedGroup {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x001d => NamedGroup::X25519,
            0x11ec => NamedGroup::X25519MlKem768,
            other => NamedGroup::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            NamedGroup::X25519 => 0x001d,
            NamedGroup::X25519MlKem768 => 0x11ec,
            NamedGroup::Unknown(other) => other,
        }
    }

    /// Whether this group includes a post-quantum component.
    pub fn is_hybrid(self) -> bool {
        matches!(self, NamedGroup::X25519MlKem768)
    }

    pub fn is_known(self) -> bool {
        !matches!(self, NamedGroup::Unknown(_))
    }
}

/// Signature schemes usable in CertificateVerify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    Ed25519,
    EcdsaSecp256r1Sha256,
    Unknown(u16),
}

impl SignatureScheme {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0807 => SignatureScheme::Ed25519,
            0x0403 => SignatureScheme::EcdsaSecp256r1Sha256,
            other => SignatureScheme::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            SignatureScheme::Ed25519 => 0x0807,
            SignatureScheme::EcdsaSecp256r1Sha256 => 0x0403,
            SignatureScheme::Unknown(other) => other,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, SignatureScheme::Unknown(_))
    }
}

/// The algorithms one endpoint is willing to negotiate, in preference order.
///
/// 一个端点愿意协商的算法集合，按偏好顺序排列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSuite {
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
}

impl ProtocolSuite {
    /// Starts building a new `ProtocolSuite`.
    pub fn builder() -> ProtocolSuiteBuilder {
        ProtocolSuiteBuilder
    }

    /// Classical-only suite: every cipher suite, X25519 only.
    pub fn classical() -> Self {
        Self {
            groups: vec![NamedGroup::X25519],
            ..Self::default()
        }
    }

    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    pub fn groups(&self) -> &[NamedGroup] {
        &self.groups
    }

    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        &self.signature_schemes
    }
}

impl Default for ProtocolSuite {
    /// All supported algorithms; the hybrid group is preferred.
    fn default() -> Self {
        Self {
            cipher_suites: CipherSuite::ALL.to_vec(),
            groups: vec![NamedGroup::X25519MlKem768, NamedGroup::X25519],
            signature_schemes: vec![SignatureScheme::Ed25519, SignatureScheme::EcdsaSecp256r1Sha256],
        }
    }
}

// --- Typestate Builder using Concrete Structs ---

/// The entry point for the builder.
pub struct ProtocolSuiteBuilder;

impl ProtocolSuiteBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self
    }

    /// Sets the cipher suites and moves to the group configuration state.
    pub fn with_cipher_suites(self, cipher_suites: Vec<CipherSuite>) -> BuilderWithCipherSuites {
        BuilderWithCipherSuites { cipher_suites }
    }
}

impl Default for ProtocolSuiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State after cipher suites are set. Requires key exchange groups.
pub struct BuilderWithCipherSuites {
    cipher_suites: Vec<CipherSuite>,
}

impl BuilderWithCipherSuites {
    /// Sets the key exchange groups, most preferred first.
    pub fn with_groups(self, groups: Vec<NamedGroup>) -> BuilderWithGroups {
        BuilderWithGroups {
            cipher_suites: self.cipher_suites,
            groups,
        }
    }
}

/// State after groups are set. Requires signature schemes.
pub struct BuilderWithGroups {
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
}

impl BuilderWithGroups {
    /// Sets the signature schemes and moves to the final, buildable state.
    pub fn with_signature_schemes(self, signature_schemes: Vec<SignatureScheme>) -> ReadyToBuild {
        ReadyToBuild {
            cipher_suites: self.cipher_suites,
            groups: self.groups,
            signature_schemes,
        }
    }
}

/// The final state where the builder can construct a `ProtocolSuite`.
pub struct ReadyToBuild {
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
}

impl ReadyToBuild {
    /// Builds the `ProtocolSuite`.
    ///
    /// Every list must be non-empty and contain only algorithms this crate
    /// implements.
    ///
    /// 构建 `ProtocolSuite`。每个列表都必须非空，且只包含本 crate 实现的算法。
    pub fn build(self) -> Result<ProtocolSuite> {
        if self.cipher_suites.is_empty() || !self.cipher_suites.iter().all(|s| s.is_known()) {
            return Err(HandshakeError::Config("cipher suites must be non-empty and known"));
        }
        if self.groups.is_empty() || !self.groups.iter().all(|g| g.is_known()) {
            return Err(HandshakeError::Config("groups must be non-empty and known"));
        }
        if self.signature_schemes.is_empty() || !self.signature_schemes.iter().all(|s| s.is_known())
        {
            return Err(HandshakeError::Config("signature schemes must be non-empty and known"));
        }
        Ok(ProtocolSuite {
            cipher_suites: self.cipher_suites,
            groups: self.groups,
            signature_schemes: self.signature_schemes,
        })
    }
}
