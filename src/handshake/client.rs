//! Implements the client side of the TLS 1.3 handshake state machine.
//！ 实现 TLS 1.3 握手状态机的客户端。

use super::Progress;
use super::common::{ConnectionCore, unexpected};
use crate::config::ClientConfig;
use crate::crypto::key_exchange::KeyShare;
use crate::crypto::key_schedule::{KeySchedule, TrafficSecret};
use crate::crypto::signature::PeerPublicKey;
use crate::crypto::suite::{CipherSuite, NamedGroup, SignatureScheme};
use crate::error::{HandshakeError, Result};
use crate::protocol::alert::AlertDescription;
use crate::protocol::message::Message;
use crate::protocol::state::ClientState;
use std::sync::Arc;
use tracing::debug;

mod builder;
mod state_authenticating;
mod state_established;
mod state_negotiating;
mod state_start;

pub use builder::HandshakeClientBuilder;

/// The contents of a server's CertificateRequest, kept until our flight is sent.
#[derive(Debug)]
struct CertificateRequestInfo {
    context: Vec<u8>,
    signature_algorithms: Vec<SignatureScheme>,
}

/// The client-side connection context.
///
/// All state changes happen inside `start`, `process` and the post-handshake
/// operations; each inspects the current [`ClientState`] and rejects messages
/// that state does not accept.
///
/// 客户端连接上下文。
///
/// 所有状态变化都发生在 `start`、`process` 以及握手后操作中；
/// 每个操作都会检查当前 [`ClientState`]，并拒绝该状态不接受的消息。
#[derive(Debug)]
pub struct HandshakeClient {
    config: Arc<ClientConfig>,
    /// Sent as SNI and checked against the server certificate.
    ///
    /// 作为 SNI 发送，并用于校验服务器证书。
    server_name: Option<String>,
    state: ClientState,
    core: ConnectionCore,
    /// One share per offered group. Dropped once the server picks one.
    ///
    /// 每个提供的组一个密钥共享。服务器选定后即丢弃。
    key_shares: Vec<KeyShare>,
    legacy_session_id: Vec<u8>,
    key_schedule: Option<KeySchedule>,
    client_handshake_secret: Option<TrafficSecret>,
    server_handshake_secret: Option<TrafficSecret>,
    cipher_suite: Option<CipherSuite>,
    group: Option<NamedGroup>,
    shared_secret_len: Option<usize>,
    alpn_protocol: Option<Vec<u8>>,
    peer_certificates: Vec<Vec<u8>>,
    /// The server's leaf key, available once its chain was accepted.
    ///
    /// 服务器叶证书公钥，证书链通过验证后可用。
    server_key: Option<PeerPublicKey>,
    certificate_request: Option<CertificateRequestInfo>,
}

impl HandshakeClient {
    /// Feeds bytes read from the transport and advances the handshake.
    ///
    /// Returns whatever must be written back plus any application data that
    /// arrived. Any protocol failure is fatal: the connection moves to
    /// `Error`, an alert record becomes available from
    /// [`take_alert_record`](Self::take_alert_record), and all later calls fail
    /// with `ConnectionFailed`.
    ///
    /// 输入从传输层读到的字节并推进握手。返回需要写回的字节以及收到的应用数据。
    /// 任何协议错误都是致命的：连接进入 `Error` 状态，可以通过
    /// [`take_alert_record`](Self::take_alert_record) 取得告警记录，之后的调用都会以
    /// `ConnectionFailed` 失败。
    pub fn process(&mut self, input: &[u8]) -> Result<Progress> {
        self.ensure_usable()?;
        if self.state == ClientState::Start {
            return Err(HandshakeError::InvalidState);
        }
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
                    ClientState::Connected => {
                        self.on_record_while_connected(other, progress)?;
                        continue;
                    }
                    _ => return Err(unexpected(&other, self.state.name())),
                },
            };
            let transcript_before = incoming.transcript_before;
            match self.state {
                ClientState::WaitServerHello => self.on_server_hello(message)?,
                ClientState::WaitEncryptedExtensions => self.on_encrypted_extensions(message)?,
                ClientState::WaitCertificateRequest => {
                    self.on_certificate_request_or_certificate(message)?
                }
                ClientState::WaitCertificate => self.on_certificate(message)?,
                ClientState::WaitCertificateVerify => {
                    self.on_certificate_verify(message, transcript_before)?
                }
                ClientState::WaitServerFinished => {
                    self.on_server_finished(message, transcript_before)?;
                    progress.handshake_complete = true;
                }
                ClientState::Connected => self.on_post_handshake_message(message)?,
                ClientState::Start | ClientState::Closed | ClientState::Error => {
                    return Err(HandshakeError::InvalidState);
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: ClientState) {
        debug!(from = %self.state, to = %next, "client state transition");
        self.state = next;
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            ClientState::Error => Err(self.core.failed_error()),
            ClientState::Closed => Err(HandshakeError::Closed),
            _ => Ok(()),
        }
    }

    /// Moves to `Error`, queueing the alert and wiping every secret.
    fn abort(&mut self, err: HandshakeError) -> HandshakeError {
        self.state = ClientState::Error;
        self.wipe_secrets();
        self.core.fail(err)
    }

    fn shut_down(&mut self) {
        self.transition(ClientState::Closed);
        self.wipe_secrets();
        self.core.discard_keys();
    }

    fn wipe_secrets(&mut self) {
        self.key_shares.clear();
        self.key_schedule = None;
        self.client_handshake_secret = None;
        self.server_handshake_secret = None;
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn is_error(&self) -> bool {
        self.state == ClientState::Error
    }

    /// The alert that ended the connection, sent or received.
    ///
    /// 结束连接的告警（无论是发送的还是收到的）。
    pub fn alert(&self) -> Option<AlertDescription> {
        self.core.alert()
    }

    /// The alert record queued by the last fatal error, if any.
    pub fn take_alert_record(&mut self) -> Option<Vec<u8>> {
        self.core.take_alert_record()
    }

    pub fn negotiated_cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    pub fn negotiated_group(&self) -> Option<NamedGroup> {
        self.group
    }

    /// Length of the key-exchange secret: 32 for X25519, 64 for the hybrid group.
    pub fn key_exchange_secret_len(&self) -> Option<usize> {
        self.shared_secret_len
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// The server's certificate chain, leaf first.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }
}
