//! Peer certificate verification.
//!
//! The handshake only depends on the [`CertificateVerifier`] trait. The shipped
//! [`TrustAnchorVerifier`] walks the presented chain up to a pinned trust
//! anchor, checking that every issuer is a CA, issuer signatures, validity
//! windows and (for servers) the DNS name.
//!
//! 对端证书验证。握手只依赖 [`CertificateVerifier`] trait；
//! 内置的 [`TrustAnchorVerifier`] 沿证书链验证到固定的信任锚，
//! 检查每个签发者是否为 CA、签发者签名、有效期以及（针对服务器）DNS 名称。

use crate::protocol::alert::AlertDescription;
use crate::crypto::signature::{KeyType, PeerPublicKey};
use crate::error::{HandshakeError, Result};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry::{OID_EC_P256, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_SIG_ED25519};
use x509_parser::prelude::FromDer;

const MAX_CHAIN_DEPTH: usize = 8;

/// Why a certificate chain was rejected.
///
/// 证书链被拒绝的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateVerdict {
    Expired,
    NotYetValid,
    HostnameMismatch,
    Untrusted,
    SignatureInvalid,
    Malformed,
    UnsupportedKey,
}

impl CertificateVerdict {
    /// The alert sent to the peer for this verdict.
    pub fn alert(self) -> AlertDescription {
        match self {
            CertificateVerdict::Expired | CertificateVerdict::NotYetValid => {
                AlertDescription::CertificateExpired
            }
            CertificateVerdict::Untrusted => AlertDescription::UnknownCa,
            CertificateVerdict::UnsupportedKey => AlertDescription::UnsupportedCertificate,
            CertificateVerdict::HostnameMismatch
            | CertificateVerdict::SignatureInvalid
            | CertificateVerdict::Malformed => AlertDescription::BadCertificate,
        }
    }
}

impl fmt::Display for CertificateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CertificateVerdict::Expired => "certificate expired",
            CertificateVerdict::NotYetValid => "certificate not yet valid",
            CertificateVerdict::HostnameMismatch => "certificate does not match host name",
            CertificateVerdict::Untrusted => "certificate chain does not reach a trust anchor",
            CertificateVerdict::SignatureInvalid => "certificate signature is invalid",
            CertificateVerdict::Malformed => "certificate could not be parsed",
            CertificateVerdict::UnsupportedKey => "certificate key type is not supported",
        })
    }
}

/// Decides whether a peer's certificate chain is acceptable.
///
/// `chain` is leaf first, as sent on the wire. `server_name` is `Some` when
/// the client verifies a server. On success the leaf public key is returned
/// for the CertificateVerify check.
///
/// 判断对端证书链是否可接受。`chain` 以叶证书开头；客户端验证服务器时
/// `server_name` 为 `Some`。成功时返回叶证书公钥，用于 CertificateVerify 校验。
pub trait CertificateVerifier: Send + Sync {
    fn verify(
        &self,
        chain: &[Vec<u8>],
        server_name: Option<&str>,
        now: SystemTime,
    ) -> std::result::Result<PeerPublicKey, CertificateVerdict>;
}

/// Verifies chains against a fixed set of DER trust anchors.
#[derive(Debug, Clone)]
pub struct TrustAnchorVerifier {
    anchors: Vec<Vec<u8>>,
}

impl TrustAnchorVerifier {
    /// Fails if any anchor is not a parseable certificate.
    pub fn new(anchors: Vec<Vec<u8>>) -> Result<Self> {
        if anchors.is_empty() {
            return Err(HandshakeError::Config("at least one trust anchor is required"));
        }
        for anchor in &anchors {
            X509Certificate::from_der(anchor)
                .map_err(|_| HandshakeError::Config("trust anchor is not a DER certificate"))?;
        }
        Ok(Self { anchors })
    }

    fn parsed_anchors(&self) -> Vec<(&[u8], X509Certificate<'_>)> {
        self.anchors
            .iter()
            .filter_map(|der| {
                X509Certificate::from_der(der)
                    .ok()
                    .map(|(_, cert)| (der.as_slice(), cert))
            })
            .collect()
    }
}

impl CertificateVerifier for TrustAnchorVerifier {
    fn verify(
        &self,
        chain: &[Vec<u8>],
        server_name: Option<&str>,
        now: SystemTime,
    ) -> std::result::Result<PeerPublicKey, CertificateVerdict> {
        if chain.is_empty() || chain.len() > MAX_CHAIN_DEPTH {
            return Err(CertificateVerdict::Malformed);
        }
        let certs = chain
            .iter()
            .map(|der| {
                X509Certificate::from_der(der)
                    .map(|(_, cert)| cert)
                    .map_err(|_| CertificateVerdict::Malformed)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let now = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        for cert in &certs {
            let validity = cert.validity();
            if now < validity.not_before.timestamp() {
                return Err(CertificateVerdict::NotYetValid);
            }
            if now > validity.not_after.timestamp() {
                return Err(CertificateVerdict::Expired);
            }
        }

        let leaf = &certs[0];
        if let Some(name) = server_name {
            if !leaf_matches_name(leaf, name) {
                return Err(CertificateVerdict::HostnameMismatch);
            }
        }

        let anchors = self.parsed_anchors();
        walk_to_anchor(chain, &certs, &anchors)?;
        leaf_public_key(leaf)
    }
}

fn walk_to_anchor(
    chain: &[Vec<u8>],
    certs: &[X509Certificate<'_>],
    anchors: &[(&[u8], X509Certificate<'_>)],
) -> std::result::Result<(), CertificateVerdict> {
    for (index, cert) in certs.iter().enumerate() {
        if anchors.iter().any(|(der, _)| *der == chain[index].as_slice()) {
            return Ok(());
        }
        let issuer_name = cert.issuer().as_raw();

        if let Some((_, anchor)) = anchors
            .iter()
            .find(|(_, anchor)| anchor.subject().as_raw() == issuer_name)
        {
            if !may_issue(anchor, index) {
                return Err(CertificateVerdict::Untrusted);
            }
            return cert
                .verify_signature(Some(anchor.public_key()))
                .map_err(|_| CertificateVerdict::SignatureInvalid);
        }

        match certs.get(index + 1) {
            Some(next) if next.subject().as_raw() == issuer_name => {
                if !may_issue(next, index) {
                    return Err(CertificateVerdict::Untrusted);
                }
                cert.verify_signature(Some(next.public_key()))
                    .map_err(|_| CertificateVerdict::SignatureInvalid)?;
            }
            _ => return Err(CertificateVerdict::Untrusted),
        }
    }
    Err(CertificateVerdict::Untrusted)
}

/// An issuer must be a CA allowed to sign certificates. `cas_below` counts the
/// intermediates between it and the leaf, for the path length limit.
///
/// 签发者必须是允许签发证书的 CA。`cas_below` 为它与叶证书之间的中间 CA 数量，用于路径长度限制。
fn may_issue(issuer: &X509Certificate<'_>, cas_below: usize) -> bool {
    let Ok(Some(constraints)) = issuer.basic_constraints() else {
        return false;
    };
    if !constraints.value.ca {
        return false;
    }
    if constraints
        .value
        .path_len_constraint
        .is_some_and(|max| cas_below > max as usize)
    {
        return false;
    }
    match issuer.key_usage() {
        Ok(Some(usage)) => usage.value.key_cert_sign(),
        Ok(None) => true,
        Err(_) => false,
    }
}

fn leaf_public_key(leaf: &X509Certificate<'_>) -> std::result::Result<PeerPublicKey, CertificateVerdict> {
    let spki = leaf.public_key();
    let bytes = spki.subject_public_key.data.to_vec();
    let algorithm = &spki.algorithm.algorithm;
    if *algorithm == OID_SIG_ED25519 {
        return Ok(PeerPublicKey {
            key_type: KeyType::Ed25519,
            bytes,
        });
    }
    if *algorithm == OID_KEY_TYPE_EC_PUBLIC_KEY {
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|p| p.as_oid().ok());
        if curve.is_some_and(|oid| oid == OID_EC_P256) {
            return Ok(PeerPublicKey {
                key_type: KeyType::EcdsaP256,
                bytes,
            });
        }
    }
    Err(CertificateVerdict::UnsupportedKey)
}

fn leaf_matches_name(leaf: &X509Certificate<'_>, name: &str) -> bool {
    let Ok(Some(san)) = leaf.subject_alternative_name() else {
        return false;
    };
    san.value.general_names.iter().any(|general_name| match general_name {
        GeneralName::DNSName(pattern) => dns_name_matches(pattern, name),
        _ => false,
    })
}

/// Case-insensitive DNS match with at most one wildcard as the whole
/// left-most label.
pub fn dns_name_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() {
        return false;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => match name.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix && suffix.contains('.'),
            None => false,
        },
        None => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_one_label_only() {
        assert!(dns_name_matches("*.example.com", "www.example.com"));
        assert!(dns_name_matches("*.example.com", "WWW.Example.com."));
        assert!(!dns_name_matches("*.example.com", "a.b.example.com"));
        assert!(!dns_name_matches("*.example.com", "example.com"));
        assert!(!dns_name_matches("*.com", "example.com"));
        assert!(dns_name_matches("localhost", "localhost"));
        assert!(!dns_name_matches("localhost", "otherhost"));
    }

    #[test]
    fn verdicts_map_to_alerts() {
        assert_eq!(
            CertificateVerdict::Expired.alert(),
            AlertDescription::CertificateExpired
        );
        assert_eq!(CertificateVerdict::Untrusted.alert(), AlertDescription::UnknownCa);
        assert_eq!(
            CertificateVerdict::HostnameMismatch.alert(),
            AlertDescription::BadCertificate
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = TrustAnchorVerifier {
            anchors: vec![vec![1, 2, 3]],
        };
        assert_eq!(
            verifier
                .verify(&[vec![0x30, 0x00]], None, SystemTime::now())
                .unwrap_err(),
            CertificateVerdict::Malformed
        );
        assert!(TrustAnchorVerifier::new(vec![vec![1, 2, 3]]).is_err());
    }
}
