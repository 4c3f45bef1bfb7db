//! Defines the states of the client and server handshake state machines.
//!
//! Each state names the point in the handshake the connection has reached and,
//! implicitly, the set of messages it will accept next.
//!
//! 定义客户端与服务器握手状态机的各个状态。
//!
//! 每个状态表示连接在握手中所处的位置，也隐含了下一步可接受的消息集合。

use crate::protocol::message::HandshakeType;
use std::fmt;

/// Client handshake states.
///
/// 客户端握手状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Built, ClientHello not yet produced.
    Start,
    WaitServerHello,
    WaitEncryptedExtensions,
    /// Accepts either CertificateRequest or the server Certificate.
    WaitCertificateRequest,
    WaitCertificate,
    WaitCertificateVerify,
    WaitServerFinished,
    Connected,
    /// Closed by a close_notify in either direction.
    Closed,
    /// Terminal failure; the captured alert explains why.
    Error,
}

impl ClientState {
    pub fn name(self) -> &'static str {
        match self {
            ClientState::Start => "Start",
            ClientState::WaitServerHello => "WaitServerHello",
            ClientState::WaitEncryptedExtensions => "WaitEncryptedExtensions",
            ClientState::WaitCertificateRequest => "WaitCertificateRequest",
            ClientState::WaitCertificate => "WaitCertificate",
            ClientState::WaitCertificateVerify => "WaitCertificateVerify",
            ClientState::WaitServerFinished => "WaitServerFinished",
            ClientState::Connected => "Connected",
            ClientState::Closed => "Closed",
            ClientState::Error => "Error",
        }
    }

    /// Handshake message types this state will decode; anything else is
    /// rejected from its type byte alone.
    ///
    /// 此状态会解码的握手消息类型；其他类型仅凭类型字节即被拒绝。
    pub fn accepts(self) -> &'static [HandshakeType] {
        use HandshakeType::*;
        match self {
            ClientState::WaitServerHello => &[ServerHello],
            ClientState::WaitEncryptedExtensions => &[EncryptedExtensions],
            ClientState::WaitCertificateRequest => &[CertificateRequest, Certificate],
            ClientState::WaitCertificate => &[Certificate],
            ClientState::WaitCertificateVerify => &[CertificateVerify],
            ClientState::WaitServerFinished => &[Finished],
            ClientState::Connected => &[KeyUpdate, NewSessionTicket],
            ClientState::Start | ClientState::Closed | ClientState::Error => &[],
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server handshake states.
///
/// 服务器握手状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Start,
    /// Transient: the ClientHello has been accepted and the server flight is
    /// being built.
    ReceivedClientHello,
    WaitClientCertificate,
    WaitClientCertificateVerify,
    WaitClientFinished,
    Connected,
    Closed,
    Error,
}

impl ServerState {
    pub fn name(self) -> &'static str {
        match self {
            ServerState::Start => "Start",
            ServerState::ReceivedClientHello => "ReceivedClientHello",
            ServerState::WaitClientCertificate => "WaitClientCertificate",
            ServerState::WaitClientCertificateVerify => "WaitClientCertificateVerify",
            ServerState::WaitClientFinished => "WaitClientFinished",
            ServerState::Connected => "Connected",
            ServerState::Closed => "Closed",
            ServerState::Error => "Error",
        }
    }

    pub fn accepts(self) -> &'static [HandshakeType] {
        use HandshakeType::*;
        match self {
            ServerState::Start => &[ClientHello],
            ServerState::WaitClientCertificate => &[Certificate],
            ServerState::WaitClientCertificateVerify => &[CertificateVerify],
            ServerState::WaitClientFinished => &[Finished],
            ServerState::Connected => &[KeyUpdate],
            ServerState::ReceivedClientHello | ServerState::Closed | ServerState::Error => &[],
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_certificate_request_state_accepts_two_types() {
        assert_eq!(
            ClientState::WaitCertificateRequest.accepts(),
            &[HandshakeType::CertificateRequest, HandshakeType::Certificate]
        );
        assert!(ClientState::Start.accepts().is_empty());
        assert!(!ServerState::Connected.accepts().contains(&HandshakeType::NewSessionTicket));
    }
}
