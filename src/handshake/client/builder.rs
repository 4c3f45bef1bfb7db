use super::HandshakeClient;
use crate::config::{ClientConfig, Missing};
use crate::error::{HandshakeError, Result};
use crate::handshake::common::ConnectionCore;
use crate::protocol::state::ClientState;
use std::sync::Arc;

/// A builder for creating a `HandshakeClient`.
///
/// The configuration is tracked at the type level, so `build()` is only
/// available once it has been supplied.
///
/// 用于创建 `HandshakeClient` 的构建器。
///
/// 配置在类型层面上被跟踪，只有在提供配置之后才能调用 `build()`。
pub struct HandshakeClientBuilder<Config> {
    config: Config,
    server_name: Option<String>,
}

impl HandshakeClientBuilder<Missing> {
    pub fn new() -> Self {
        Self {
            config: Missing,
            server_name: None,
        }
    }
}

impl Default for HandshakeClientBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Config> HandshakeClientBuilder<Config> {
    /// Sets the shared client configuration.
    ///
    /// 设置共享的客户端配置。
    pub fn config(self, config: Arc<ClientConfig>) -> HandshakeClientBuilder<Arc<ClientConfig>> {
        HandshakeClientBuilder {
            config,
            server_name: self.server_name,
        }
    }

    /// The DNS name sent as SNI and matched against the server certificate.
    ///
    /// Without it the certificate chain is still verified, but not its name.
    ///
    /// 作为 SNI 发送并与服务器证书匹配的 DNS 名称。
    /// 未设置时仍会验证证书链，但不校验名称。
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

impl HandshakeClientBuilder<Arc<ClientConfig>> {
    /// Builds the `HandshakeClient` in the `Start` state.
    ///
    /// 构建处于 `Start` 状态的 `HandshakeClient`。
    pub fn build(self) -> Result<HandshakeClient> {
        if let Some(name) = &self.server_name {
            if name.is_empty() || name.len() > 253 || !name.is_ascii() {
                return Err(HandshakeError::Config("server name must be a 1..=253 byte ASCII DNS name"));
            }
        }
        let record_padding = self.config.record_padding();
        Ok(HandshakeClient {
            config: self.config,
            server_name: self.server_name,
            state: ClientState::Start,
            core: ConnectionCore::new(record_padding),
            key_shares: Vec::new(),
            legacy_session_id: Vec::new(),
            key_schedule: None,
            client_handshake_secret: None,
            server_handshake_secret: None,
            cipher_suite: None,
            group: None,
            shared_secret_len: None,
            alpn_protocol: None,
            peer_certificates: Vec::new(),
            server_key: None,
            certificate_request: None,
        })
    }
}
