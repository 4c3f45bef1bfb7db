//! TLS alert protocol (RFC 8446 §6).
//!
//! TLS 告警协议。

use crate::error::{HandshakeError, Result};
use std::fmt;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// Alert descriptions defined for TLS 1.3.
///
/// TLS 1.3 中定义的告警描述。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    InappropriateFallback = 86,
    UserCanceled = 90,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    BadCertificateStatusResponse = 113,
    UnknownPskIdentity = 115,
    CertificateRequired = 116,
    NoApplicationProtocol = 120,
}

impl AlertDescription {
    pub fn from_u8(value: u8) -> Option<Self> {
        use AlertDescription::*;
        Some(match value {
            0 => CloseNotify,
            10 => UnexpectedMessage,
            20 => BadRecordMac,
            22 => RecordOverflow,
            40 => HandshakeFailure,
            42 => BadCertificate,
            43 => UnsupportedCertificate,
            44 => CertificateRevoked,
            45 => CertificateExpired,
            46 => CertificateUnknown,
            47 => IllegalParameter,
            48 => UnknownCa,
            49 => AccessDenied,
            50 => DecodeError,
            51 => DecryptError,
            70 => ProtocolVersion,
            71 => InsufficientSecurity,
            80 => InternalError,
            86 => InappropriateFallback,
            90 => UserCanceled,
            109 => MissingExtension,
            110 => UnsupportedExtension,
            112 => UnrecognizedName,
            113 => BadCertificateStatusResponse,
            115 => UnknownPskIdentity,
            116 => CertificateRequired,
            120 => NoApplicationProtocol,
            _ => return None,
        })
    }

    /// The lowercase RFC name, suitable for log fields.
    pub fn name(self) -> &'static str {
        use AlertDescription::*;
        match self {
            CloseNotify => "close_notify",
            UnexpectedMessage => "unexpected_message",
            BadRecordMac => "bad_record_mac",
            RecordOverflow => "record_overflow",
            HandshakeFailure => "handshake_failure",
            BadCertificate => "bad_certificate",
            UnsupportedCertificate => "unsupported_certificate",
            CertificateRevoked => "certificate_revoked",
            CertificateExpired => "certificate_expired",
            CertificateUnknown => "certificate_unknown",
            IllegalParameter => "illegal_parameter",
            UnknownCa => "unknown_ca",
            AccessDenied => "access_denied",
            DecodeError => "decode_error",
            DecryptError => "decrypt_error",
            ProtocolVersion => "protocol_version",
            InsufficientSecurity => "insufficient_security",
            InternalError => "internal_error",
            InappropriateFallback => "inappropriate_fallback",
            UserCanceled => "user_canceled",
            MissingExtension => "missing_extension",
            UnsupportedExtension => "unsupported_extension",
            UnrecognizedName => "unrecognized_name",
            BadCertificateStatusResponse => "bad_certificate_status_response",
            UnknownPskIdentity => "unknown_psk_identity",
            CertificateRequired => "certificate_required",
            NoApplicationProtocol => "no_application_protocol",
        }
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), *self as u8)
    }
}

/// A two-byte alert message.
///
/// 两字节的告警消息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    /// Parses an alert fragment. Unknown descriptions and levels are decode errors.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let [level, description] = bytes else {
            return Err(HandshakeError::Decode("alert must be exactly two bytes"));
        };
        let level = match level {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => return Err(HandshakeError::Decode("unknown alert level")),
        };
        let description = AlertDescription::from_u8(*description)
            .ok_or(HandshakeError::Decode("unknown alert description"))?;
        Ok(Self { level, description })
    }
}
