use super::{HandshakeClient, HandshakeClientBuilder};
use crate::config::Missing;
use crate::crypto::key_exchange::KeyShare;
use crate::error::{HandshakeError, Result};
use crate::protocol::extension::{Extension, KeyShareEntry, TLS13};
use crate::protocol::message::{ClientHello, HandshakeMessage};
use crate::protocol::state::ClientState;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

impl HandshakeClient {
    /// Creates a new `HandshakeClientBuilder` to construct a `HandshakeClient`.
    ///
    /// 创建一个用于构造 `HandshakeClient` 的构建器。
    pub fn builder() -> HandshakeClientBuilder<Missing> {
        HandshakeClientBuilder::new()
    }

    /// Starts the handshake and returns the ClientHello record.
    ///
    /// One key share is generated for every configured group so the server
    /// can always answer without a HelloRetryRequest.
    ///
    /// 启动握手并返回 ClientHello 记录。
    ///
    /// 为每个配置的组生成一个密钥共享，这样服务器无需 HelloRetryRequest 即可应答。
    pub fn start(&mut self) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        if self.state != ClientState::Start {
            return Err(HandshakeError::InvalidState);
        }
        match self.send_client_hello() {
            Ok(()) => {
                self.transition(ClientState::WaitServerHello);
                Ok(self.core.take_output())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    fn send_client_hello(&mut self) -> Result<()> {
        let suite = self.config.suite().clone();

        self.key_shares = suite
            .groups()
            .iter()
            .map(|&group| KeyShare::generate(group))
            .collect::<Result<_>>()?;

        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        let mut legacy_session_id = vec![0u8; 32];
        OsRng.fill_bytes(&mut legacy_session_id);
        self.legacy_session_id = legacy_session_id.clone();

        let mut extensions = Vec::with_capacity(6);
        if let Some(name) = &self.server_name {
            extensions.push(Extension::ServerName(name.clone()));
        }
        extensions.push(Extension::SupportedVersions(vec![TLS13]));
        extensions.push(Extension::SupportedGroups(suite.groups().to_vec()));
        extensions.push(Extension::SignatureAlgorithms(
            suite.signature_schemes().to_vec(),
        ));
        extensions.push(Extension::KeyShares(
            self.key_shares
                .iter()
                .map(|share| KeyShareEntry {
                    group: share.group(),
                    key_exchange: share.public_key().to_vec(),
                })
                .collect(),
        ));
        if !self.config.alpn_protocols().is_empty() {
            extensions.push(Extension::Alpn(self.config.alpn_protocols().to_vec()));
        }

        let hello = HandshakeMessage::ClientHello(ClientHello {
            random,
            legacy_session_id,
            cipher_suites: suite.cipher_suites().to_vec(),
            compression_methods: vec![0],
            extensions,
        });
        debug!(
            groups = ?suite.groups(),
            cipher_suites = ?suite.cipher_suites(),
            server_name = ?self.server_name,
            "sending ClientHello"
        );
        self.core.send_handshake(&hello)
    }
}
