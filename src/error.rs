use crate::protocol::alert::AlertDescription;
use crate::verify::CertificateVerdict;
use thiserror::Error;

/// Broad classes of handshake failures.
///
/// Protocol failures (everything except `Resource` and `Usage`) are caused by
/// the peer or the wire; `Resource` and `Usage` indicate misuse by the caller.
///
/// 握手失败的大类。
///
/// 协议类错误（除 `Resource` 和 `Usage` 外）由对端或线路数据引起；
/// `Resource` 和 `Usage` 表示调用方的误用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or truncated record/handshake framing.
    Framing,
    /// AEAD tag or Finished MAC mismatch, or a bad signature.
    Authentication,
    /// A message arrived in a state that does not accept it.
    Sequencing,
    /// The certificate verification hook rejected the peer.
    Certificate,
    /// No common parameters, or the peer chose parameters we never offered.
    Negotiation,
    /// Output buffer too small, plaintext too large, sequence exhaustion.
    Resource,
    /// The peer sent a fatal alert.
    Peer,
    /// The caller used the API incorrectly (bad configuration, wrong state).
    Usage,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("malformed message: {0}")]
    Decode(&'static str),

    #[error("record exceeds the maximum permitted length")]
    RecordOverflow,

    #[error("record decryption failed")]
    BadRecordMac,

    #[error("unexpected {message} in state {state}")]
    UnexpectedMessage {
        message: &'static str,
        state: &'static str,
    },

    #[error("finished verify data mismatch")]
    FinishedMismatch,

    #[error("CertificateVerify signature is invalid")]
    InvalidSignature,

    #[error("peer certificate rejected: {0}")]
    Certificate(CertificateVerdict),

    #[error("peer did not provide a required client certificate")]
    CertificateRequired,

    #[error("handshake failure: {0}")]
    HandshakeFailure(&'static str),

    #[error("illegal parameter: {0}")]
    IllegalParameter(&'static str),

    #[error("missing required extension: {0}")]
    MissingExtension(&'static str),

    #[error("peer does not support TLS 1.3")]
    ProtocolVersion,

    #[error("no mutually supported application protocol")]
    NoApplicationProtocol,

    #[error("peer sent fatal alert {0}")]
    PeerAlert(AlertDescription),

    #[error("connection previously failed with {0}")]
    ConnectionFailed(AlertDescription),

    #[error("connection is closed")]
    Closed,

    #[error("plaintext of {0} bytes exceeds the record limit")]
    PlaintextTooLarge(usize),

    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("sequence number space exhausted for the current key")]
    SequenceExhausted,

    #[error("requested output length {0} is out of range")]
    InvalidLength(usize),

    #[error("invalid state transition attempted")]
    InvalidState,

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("builder is missing required field `{0}`")]
    BuilderMissingField(&'static str),

    #[error("cryptographic primitive failed: {0}")]
    Crypto(&'static str),
}

impl HandshakeError {
    /// The error class this failure belongs to.
    ///
    /// 此错误所属的类别。
    pub fn kind(&self) -> ErrorKind {
        use HandshakeError::*;
        match self {
            Decode(_) | RecordOverflow => ErrorKind::Framing,
            BadRecordMac | FinishedMismatch | InvalidSignature => ErrorKind::Authentication,
            UnexpectedMessage { .. } => ErrorKind::Sequencing,
            Certificate(_) | CertificateRequired => ErrorKind::Certificate,
            HandshakeFailure(_)
            | IllegalParameter(_)
            | MissingExtension(_)
            | ProtocolVersion
            | NoApplicationProtocol => ErrorKind::Negotiation,
            PlaintextTooLarge(_) | BufferTooSmall { .. } | SequenceExhausted => {
                ErrorKind::Resource
            }
            PeerAlert(_) | ConnectionFailed(_) | Closed => ErrorKind::Peer,
            InvalidLength(_) | InvalidState | Config(_) | BuilderMissingField(_) | Crypto(_) => {
                ErrorKind::Usage
            }
        }
    }

    /// The alert that should be sent to the peer for this failure, if any.
    ///
    /// Errors caused by the peer's own alert (or by a connection that already
    /// failed) produce no outbound alert.
    ///
    /// 针对此错误应发送给对端的告警（如果有）。
    pub fn alert(&self) -> Option<AlertDescription> {
        use HandshakeError::*;
        Some(match self {
            Decode(_) => AlertDescription::DecodeError,
            RecordOverflow => AlertDescription::RecordOverflow,
            BadRecordMac => AlertDescription::BadRecordMac,
            UnexpectedMessage { .. } => AlertDescription::UnexpectedMessage,
            FinishedMismatch | InvalidSignature => AlertDescription::DecryptError,
            Certificate(verdict) => verdict.alert(),
            CertificateRequired => AlertDescription::CertificateRequired,
            HandshakeFailure(_) => AlertDescription::HandshakeFailure,
            IllegalParameter(_) => AlertDescription::IllegalParameter,
            MissingExtension(_) => AlertDescription::MissingExtension,
            ProtocolVersion => AlertDescription::ProtocolVersion,
            NoApplicationProtocol => AlertDescription::NoApplicationProtocol,
            PeerAlert(_) | ConnectionFailed(_) | Closed => return None,
            PlaintextTooLarge(_)
            | BufferTooSmall { .. }
            | SequenceExhausted
            | InvalidLength(_)
            | InvalidState
            | Config(_)
            | BuilderMissingField(_)
            | Crypto(_) => AlertDescription::InternalError,
        })
    }
}

pub type Result<T> = std::result::Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_share_one_alert() {
        assert_eq!(
            HandshakeError::FinishedMismatch.alert(),
            Some(AlertDescription::DecryptError)
        );
        assert_eq!(
            HandshakeError::InvalidSignature.alert(),
            Some(AlertDescription::DecryptError)
        );
        assert_eq!(HandshakeError::BadRecordMac.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn resource_errors_are_distinct_from_protocol_errors() {
        for err in [
            HandshakeError::PlaintextTooLarge(20_000),
            HandshakeError::SequenceExhausted,
            HandshakeError::BufferTooSmall {
                needed: 10,
                available: 5,
            },
        ] {
            assert_eq!(err.kind(), ErrorKind::Resource);
        }
        assert_eq!(
            HandshakeError::UnexpectedMessage {
                message: "Finished",
                state: "WaitServerHello"
            }
            .kind(),
            ErrorKind::Sequencing
        );
    }

    #[test]
    fn peer_alerts_are_not_echoed() {
        assert!(
            HandshakeError::PeerAlert(AlertDescription::HandshakeFailure)
                .alert()
                .is_none()
        );
    }
}
