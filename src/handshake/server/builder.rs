use super::HandshakeServer;
use crate::config::{Missing, ServerConfig};
use crate::error::Result;
use crate::handshake::common::ConnectionCore;
use crate::protocol::state::ServerState;
use std::sync::Arc;

/// A builder for creating a `HandshakeServer`.
///
/// This builder uses the typestate pattern to ensure the configuration is
/// provided at compile time.
///
/// 用于创建 `HandshakeServer` 的构建器。
///
/// 此构建器使用类型状态模式，确保在编译时提供配置。
pub struct HandshakeServerBuilder<Config> {
    config: Config,
}

impl HandshakeServerBuilder<Missing> {
    pub fn new() -> Self {
        Self { config: Missing }
    }
}

impl Default for HandshakeServerBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Config> HandshakeServerBuilder<Config> {
    /// Sets the shared server configuration.
    ///
    /// 设置共享的服务器配置。
    pub fn config(self, config: Arc<ServerConfig>) -> HandshakeServerBuilder<Arc<ServerConfig>> {
        HandshakeServerBuilder { config }
    }
}

impl HandshakeServerBuilder<Arc<ServerConfig>> {
    /// Builds the `HandshakeServer`, waiting for a ClientHello.
    ///
    /// 构建 `HandshakeServer`，等待 ClientHello。
    pub fn build(self) -> Result<HandshakeServer> {
        let record_padding = self.config.record_padding();
        Ok(HandshakeServer {
            config: self.config,
            state: ServerState::Start,
            core: ConnectionCore::new(record_padding),
            key_schedule: None,
            client_handshake_secret: None,
            server_finished_hash: None,
            cipher_suite: None,
            group: None,
            shared_secret_len: None,
            server_name: None,
            alpn_protocol: None,
            peer_certificates: Vec::new(),
            client_key: None,
            client_cert_received: false,
            client_cert_verified: false,
        })
    }
}
