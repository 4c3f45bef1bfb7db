//! Implements the server side of the TLS 1.3 handshake state machine.
//! 实现 TLS 1.3 握手状态机的服务器端。

use super::Progress;
use super::common::{ConnectionCore, unexpected};
use crate::config::{ClientAuthMode, ServerConfig};
use crate::crypto::key_schedule::{KeySchedule, TrafficSecret};
use crate::crypto::signature::PeerPublicKey;
use crate::crypto::suite::{CipherSuite, NamedGroup};
use crate::error::{HandshakeError, Result};
use crate::protocol::alert::AlertDescription;
use crate::protocol::message::Message;
use crate::protocol::state::ServerState;
use std::sync::Arc;
use tracing::debug;

mod builder;
mod state_client_auth;
mod state_established;
mod state_start;

pub use builder::HandshakeServerBuilder;

/// The server-side connection context.
///
/// The server speaks second: it waits in `Start` for a ClientHello, answers
/// with its whole flight in one `process` call, then waits for the client's
/// (optional) certificate and Finished.
///
/// 服务器端连接上下文。
///
/// 服务器后发言：在 `Start` 状态等待 ClientHello，在一次 `process` 调用中
/// 发送完整的应答消息组，然后等待客户端的（可选）证书与 Finished。
#[derive(Debug)]
pub struct HandshakeServer {
    config: Arc<ServerConfig>,
    state: ServerState,
    core: ConnectionCore,
    /// Held in the Handshake stage until the client Finished is verified.
    ///
    /// 在客户端 Finished 验证通过之前一直停留在 Handshake 阶段。
    key_schedule: Option<KeySchedule>,
    client_handshake_secret: Option<TrafficSecret>,
    /// Transcript hash through our Finished; the application secrets bind it.
    ///
    /// 截至本端 Finished 的握手记录哈希，应用流量密钥以此为上下文。
    server_finished_hash: Option<Vec<u8>>,
    cipher_suite: Option<CipherSuite>,
    group: Option<NamedGroup>,
    shared_secret_len: Option<usize>,
    server_name: Option<String>,
    alpn_protocol: Option<Vec<u8>>,
    peer_certificates: Vec<Vec<u8>>,
    client_key: Option<PeerPublicKey>,
    client_cert_received: bool,
    client_cert_verified: bool,
}

impl HandshakeServer {
    /// Feeds bytes read from the transport and advances the handshake.
    ///
    /// The same failure rules as the client apply: any error is fatal and
    /// leaves an alert record behind.
    ///
    /// 输入从传输层读到的字节并推进握手。失败规则与客户端相同：
    /// 任何错误都是致命的，并会留下一条告警记录。
    pub fn process(&mut self, input: &[u8]) -> Result<Progress> {
        self.ensure_usable()?;
        self.core.record.feed(input);
        let mut progress = Progress::default();
        match self.drive(&mut progress) {
            Ok(()) => {
                progress.to_send = self.core.take_output();
                if progress.peer_closed {
                    self.shut_down();
                }
                Ok(progress)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    fn drive(&mut self, progress: &mut Progress) -> Result<()> {
        while let Some(incoming) = self.core.next_incoming(self.state.name(), self.state.accepts())? {
            let message = match incoming.message {
                Message::Alert(alert) => {
                    if self.core.handle_alert(alert)? {
                        progress.peer_closed = true;
                        return Ok(());
                    }
                    continue;
                }
                Message::Handshake(message) => message,
                other => match self.state {
                    ServerState::Connected => {
                        self.on_record_while_connected(other, progress)?;
                        continue;
                    }
                    _ => return Err(unexpected(&other, self.state.name())),
                },
            };
            let transcript_before = incoming.transcript_before;
            match self.state {
                ServerState::Start => self.on_client_hello(message)?,
                ServerState::WaitClientCertificate => self.on_client_certificate(message)?,
                ServerState::WaitClientCertificateVerify => {
                    self.on_client_certificate_verify(message, transcript_before)?
                }
                ServerState::WaitClientFinished => {
                    self.on_client_finished(message, transcript_before)?;
                    progress.handshake_complete = true;
                }
                ServerState::Connected => self.on_post_handshake_message(message)?,
                ServerState::ReceivedClientHello | ServerState::Closed | ServerState::Error => {
                    return Err(HandshakeError::InvalidState);
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: ServerState) {
        debug!(from = %self.state, to = %next, "server state transition");
        self.state = next;
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            ServerState::Error => Err(self.core.failed_error()),
            ServerState::Closed => Err(HandshakeError::Closed),
            _ => Ok(()),
        }
    }

    fn abort(&mut self, err: HandshakeError) -> HandshakeError {
        self.state = ServerState::Error;
        self.wipe_secrets();
        self.core.fail(err)
    }

    fn shut_down(&mut self) {
        self.transition(ServerState::Closed);
        self.wipe_secrets();
        self.core.discard_keys();
    }

    fn wipe_secrets(&mut self) {
        self.key_schedule = None;
        self.client_handshake_secret = None;
        self.server_finished_hash = None;
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ServerState::Connected
    }

    pub fn is_error(&self) -> bool {
        self.state == ServerState::Error
    }

    pub fn alert(&self) -> Option<AlertDescription> {
        self.core.alert()
    }

    pub fn take_alert_record(&mut self) -> Option<Vec<u8>> {
        self.core.take_alert_record()
    }

    pub fn negotiated_cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    pub fn negotiated_group(&self) -> Option<NamedGroup> {
        self.group
    }

    pub fn key_exchange_secret_len(&self) -> Option<usize> {
        self.shared_secret_len
    }

    /// The host name the client sent as SNI.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    /// The client's certificate chain, empty unless one was presented.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }

    /// Whether an empty client Certificate aborts the handshake.
    ///
    /// 空的客户端证书是否会中止握手。
    pub fn client_cert_required(&self) -> bool {
        self.config.client_auth() == ClientAuthMode::Required
    }

    /// Set once the client sent a non-empty Certificate.
    pub fn client_cert_received(&self) -> bool {
        self.client_cert_received
    }

    /// Set once the client's CertificateVerify checked out.
    pub fn client_cert_verified(&self) -> bool {
        self.client_cert_verified
    }
}
