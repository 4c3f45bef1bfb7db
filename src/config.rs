//! Immutable endpoint configuration shared by many connections.
//!
//! Both configs are built once, wrapped in an `Arc`, and handed to every
//! connection context. Required parts are tracked with typestate: `build()` only
//! exists once they have been supplied.
//!
//! 多个连接共享的不可变端点配置。两种配置只构建一次，用 `Arc` 包装后交给每个连接上下文。
//! 必需字段通过类型状态跟踪：只有提供了它们之后才会出现 `build()`。

use crate::crypto::signature::SigningKey;
use crate::crypto::suite::ProtocolSuite;
use crate::error::{HandshakeError, Result};
use crate::verify::CertificateVerifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Marker type for a missing field in a builder.
///
/// 用于在构建器中标记缺失字段的类型。
#[derive(Debug, Default)]
pub struct Missing;

/// Whether the server asks for a client certificate.
///
/// 服务器是否请求客户端证书。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMode {
    /// No CertificateRequest is sent.
    #[default]
    None,
    /// CertificateRequest is sent; an empty client Certificate is accepted.
    Optional,
    /// An empty client Certificate aborts with `certificate_required`.
    Required,
}

/// A certificate chain (leaf first, DER) with the leaf's private key.
pub struct CertifiedKey {
    chain: Vec<Vec<u8>>,
    key: SigningKey,
}

impl CertifiedKey {
    pub fn new(chain: Vec<Vec<u8>>, key: SigningKey) -> Result<Self> {
        if chain.is_empty() {
            return Err(HandshakeError::Config("certificate chain is empty"));
        }
        Ok(Self { chain, key })
    }

    /// Builds from DER certificates and a PKCS#8 DER private key.
    pub fn from_der(chain: Vec<Vec<u8>>, pkcs8_key: &[u8]) -> Result<Self> {
        Self::new(chain, SigningKey::from_pkcs8_der(pkcs8_key)?)
    }

    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for CertifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKey")
            .field("chain_len", &self.chain.len())
            .field("key", &self.key)
            .finish()
    }
}

fn check_alpn(protocols: &[Vec<u8>]) -> Result<()> {
    if protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
        return Err(HandshakeError::Config("ALPN protocol names must be 1..=255 bytes"));
    }
    Ok(())
}

fn check_key_in_suite(suite: &ProtocolSuite, certified: &CertifiedKey) -> Result<()> {
    if !suite.signature_schemes().contains(&certified.key().scheme()) {
        return Err(HandshakeError::Config("certificate key scheme is not in the protocol suite"));
    }
    Ok(())
}

/// Server-side configuration.
///
/// 服务器端配置。
pub struct ServerConfig {
    suite: ProtocolSuite,
    certificate: CertifiedKey,
    client_auth: ClientAuthMode,
    client_verifier: Option<Arc<dyn CertificateVerifier>>,
    alpn_protocols: Vec<Vec<u8>>,
    record_padding: usize,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder<Missing> {
        ServerConfigBuilder {
            certificate: Missing,
            suite: ProtocolSuite::default(),
            client_auth: ClientAuthMode::None,
            client_verifier: None,
            alpn_protocols: Vec::new(),
            record_padding: 0,
        }
    }

    pub fn suite(&self) -> &ProtocolSuite {
        &self.suite
    }

    pub fn certificate(&self) -> &CertifiedKey {
        &self.certificate
    }

    pub fn client_auth(&self) -> ClientAuthMode {
        self.client_auth
    }

    pub fn client_verifier(&self) -> Option<&dyn CertificateVerifier> {
        self.client_verifier.as_deref()
    }

    /// Protocols in server preference order.
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    pub fn record_padding(&self) -> usize {
        self.record_padding
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("suite", &self.suite)
            .field("certificate", &self.certificate)
            .field("client_auth", &self.client_auth)
            .field("alpn_protocols", &self.alpn_protocols)
            .field("record_padding", &self.record_padding)
            .finish_non_exhaustive()
    }
}

/// A builder for creating a `ServerConfig`.
///
/// The certificate is required; everything else has a default.
///
/// 用于创建 `ServerConfig` 的构建器。证书为必需项，其余字段都有默认值。
pub struct ServerConfigBuilder<Cert> {
    certificate: Cert,
    suite: ProtocolSuite,
    client_auth: ClientAuthMode,
    client_verifier: Option<Arc<dyn CertificateVerifier>>,
    alpn_protocols: Vec<Vec<u8>>,
    record_padding: usize,
}

impl<Cert> ServerConfigBuilder<Cert> {
    /// Sets the server's certificate chain and signing key.
    ///
    /// 设置服务器的证书链与签名密钥。
    pub fn certificate(self, certificate: CertifiedKey) -> ServerConfigBuilder<CertifiedKey> {
        ServerConfigBuilder {
            certificate,
            suite: self.suite,
            client_auth: self.client_auth,
            client_verifier: self.client_verifier,
            alpn_protocols: self.alpn_protocols,
            record_padding: self.record_padding,
        }
    }

    pub fn suite(mut self, suite: ProtocolSuite) -> Self {
        self.suite = suite;
        self
    }

    /// Requests client certificates and sets the verifier that judges them.
    ///
    /// 请求客户端证书，并设置用于验证它们的验证器。
    pub fn client_auth(mut self, mode: ClientAuthMode, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.client_auth = mode;
        self.client_verifier = Some(verifier);
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Zero bytes of padding added to every protected record.
    pub fn record_padding(mut self, padding: usize) -> Self {
        self.record_padding = padding;
        self
    }
}

impl ServerConfigBuilder<CertifiedKey> {
    /// Builds the `ServerConfig`.
    ///
    /// This method is only available once a certificate has been provided.
    ///
    /// 构建 `ServerConfig`。此方法仅在提供了证书之后可用。
    pub fn build(self) -> Result<ServerConfig> {
        check_key_in_suite(&self.suite, &self.certificate)?;
        check_alpn(&self.alpn_protocols)?;
        if self.client_auth != ClientAuthMode::None && self.client_verifier.is_none() {
            return Err(HandshakeError::BuilderMissingField("client_verifier"));
        }
        Ok(ServerConfig {
            suite: self.suite,
            certificate: self.certificate,
            client_auth: self.client_auth,
            client_verifier: self.client_verifier,
            alpn_protocols: self.alpn_protocols,
            record_padding: self.record_padding,
        })
    }
}

/// Client-side configuration.
///
/// 客户端配置。
pub struct ClientConfig {
    suite: ProtocolSuite,
    verifier: Arc<dyn CertificateVerifier>,
    client_certificate: Option<CertifiedKey>,
    alpn_protocols: Vec<Vec<u8>>,
    record_padding: usize,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder<Missing> {
        ClientConfigBuilder {
            verifier: Missing,
            suite: ProtocolSuite::default(),
            client_certificate: None,
            alpn_protocols: Vec::new(),
            record_padding: 0,
        }
    }

    pub fn suite(&self) -> &ProtocolSuite {
        &self.suite
    }

    pub fn verifier(&self) -> &dyn CertificateVerifier {
        self.verifier.as_ref()
    }

    pub fn client_certificate(&self) -> Option<&CertifiedKey> {
        self.client_certificate.as_ref()
    }

    /// Protocols offered, in client preference order.
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    pub fn record_padding(&self) -> usize {
        self.record_padding
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("suite", &self.suite)
            .field("client_certificate", &self.client_certificate)
            .field("alpn_protocols", &self.alpn_protocols)
            .field("record_padding", &self.record_padding)
            .finish_non_exhaustive()
    }
}

/// A builder for creating a `ClientConfig`.
///
/// A server certificate verifier is required.
///
/// 用于创建 `ClientConfig` 的构建器。服务器证书验证器为必需项。
pub struct ClientConfigBuilder<Verifier> {
    verifier: Verifier,
    suite: ProtocolSuite,
    client_certificate: Option<CertifiedKey>,
    alpn_protocols: Vec<Vec<u8>>,
    record_padding: usize,
}

impl<Verifier> ClientConfigBuilder<Verifier> {
    /// Sets the verifier for server certificate chains.
    pub fn verifier(
        self,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> ClientConfigBuilder<Arc<dyn CertificateVerifier>> {
        ClientConfigBuilder {
            verifier,
            suite: self.suite,
            client_certificate: self.client_certificate,
            alpn_protocols: self.alpn_protocols,
            record_padding: self.record_padding,
        }
    }

    pub fn suite(mut self, suite: ProtocolSuite) -> Self {
        self.suite = suite;
        self
    }

    /// Certificate presented when the server sends a CertificateRequest.
    pub fn client_certificate(mut self, certificate: CertifiedKey) -> Self {
        self.client_certificate = Some(certificate);
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    pub fn record_padding(mut self, padding: usize) -> Self {
        self.record_padding = padding;
        self
    }
}

impl ClientConfigBuilder<Arc<dyn CertificateVerifier>> {
    /// Builds the `ClientConfig`.
    pub fn build(self) -> Result<ClientConfig> {
        if let Some(certificate) = &self.client_certificate {
            check_key_in_suite(&self.suite, certificate)?;
        }
        check_alpn(&self.alpn_protocols)?;
        Ok(ClientConfig {
            suite: self.suite,
            verifier: self.verifier,
            client_certificate: self.client_certificate,
            alpn_protocols: self.alpn_protocols,
            record_padding: self.record_padding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_auth_mode_reads_from_config_text() {
        let mode: ClientAuthMode = serde_json::from_str("\"required\"").unwrap();
        assert_eq!(mode, ClientAuthMode::Required);
        assert_eq!(serde_json::to_string(&ClientAuthMode::Optional).unwrap(), "\"optional\"");
        assert_eq!(ClientAuthMode::default(), ClientAuthMode::None);
    }

    #[test]
    fn empty_chain_is_rejected() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[1; 32]);
        assert!(CertifiedKey::new(vec![], SigningKey::Ed25519(Box::new(key))).is_err());
    }
}
