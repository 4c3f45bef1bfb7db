//! Defines the messages exchanged during the handshake and their wire encoding.
//!
//! Every handshake message is framed as `type(1) || length(3) || body`.
//! [`HandshakeMessage::encode`] produces the framed bytes that are both sent
//! and folded into the transcript.
//!
//! 定义握手过程中交换的消息及其线路编码。

use crate::crypto::suite::{CipherSuite, SignatureScheme};
use crate::error::{HandshakeError, Result};
use crate::protocol::alert::Alert;
use crate::protocol::codec::{Reader, put_u16, put_u24, with_u8_length, with_u16_length, with_u24_length};
use crate::protocol::extension::{
    Extension, ExtensionContext, decode_extensions, encode_extensions,
};

pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// SHA-256("HelloRetryRequest"), the ServerHello.random that marks a HelloRetryRequest.
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

const LEGACY_VERSION: u16 = 0x0303;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
    KeyUpdate = 24,
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use HandshakeType::*;
        Some(match value {
            1 => ClientHello,
            2 => ServerHello,
            4 => NewSessionTicket,
            8 => EncryptedExtensions,
            11 => Certificate,
            13 => CertificateRequest,
            15 => CertificateVerify,
            20 => Finished,
            24 => KeyUpdate,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: [u8; 32],
    pub legacy_session_id_echo: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }
}

/// One entry of a Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub cert_data: Vec<u8>,
    /// Raw per-certificate extension block (OCSP, SCT); carried but not interpreted.
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateRequest {
    NotRequested,
    Requested,
}

/// Handshake messages.
///
/// 握手消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    EncryptedExtensions(Vec<Extension>),
    CertificateRequest {
        context: Vec<u8>,
        signature_algorithms: Vec<SignatureScheme>,
    },
    Certificate {
        context: Vec<u8>,
        entries: Vec<CertificateEntry>,
    },
    CertificateVerify {
        scheme: SignatureScheme,
        signature: Vec<u8>,
    },
    Finished {
        verify_data: Vec<u8>,
    },
    KeyUpdate(KeyUpdateRequest),
    /// Parsed so a client can skip it; never produced.
    NewSessionTicket {
        lifetime: u32,
        age_add: u32,
        nonce: Vec<u8>,
        ticket: Vec<u8>,
    },
}

impl HandshakeMessage {
    pub fn typ(&self) -> HandshakeType {
        match self {
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            HandshakeMessage::CertificateRequest { .. } => HandshakeType::CertificateRequest,
            HandshakeMessage::Certificate { .. } => HandshakeType::Certificate,
            HandshakeMessage::CertificateVerify { .. } => HandshakeType::CertificateVerify,
            HandshakeMessage::Finished { .. } => HandshakeType::Finished,
            HandshakeMessage::KeyUpdate(_) => HandshakeType::KeyUpdate,
            HandshakeMessage::NewSessionTicket { .. } => HandshakeType::NewSessionTicket,
        }
    }

    pub fn name(&self) -> &'static str {
        handshake_type_name(self.typ())
    }

    /// Encodes the message including its four-byte header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.typ() as u8);
        with_u24_length(&mut out, |out| self.encode_body(out));
        out
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            HandshakeMessage::ClientHello(hello) => {
                put_u16(out, LEGACY_VERSION);
                out.extend_from_slice(&hello.random);
                with_u8_length(out, |out| out.extend_from_slice(&hello.legacy_session_id));
                with_u16_length(out, |out| {
                    for suite in &hello.cipher_suites {
                        put_u16(out, suite.to_u16());
                    }
                });
                with_u8_length(out, |out| out.extend_from_slice(&hello.compression_methods));
                encode_extensions(out, &hello.extensions);
            }
            HandshakeMessage::ServerHello(hello) => {
                put_u16(out, LEGACY_VERSION);
                out.extend_from_slice(&hello.random);
                with_u8_length(out, |out| out.extend_from_slice(&hello.legacy_session_id_echo));
                put_u16(out, hello.cipher_suite.to_u16());
                out.push(0);
                encode_extensions(out, &hello.extensions);
            }
            HandshakeMessage::EncryptedExtensions(extensions) => encode_extensions(out, extensions),
            HandshakeMessage::CertificateRequest {
                context,
                signature_algorithms,
            } => {
                with_u8_length(out, |out| out.extend_from_slice(context));
                encode_extensions(
                    out,
                    &[Extension::SignatureAlgorithms(signature_algorithms.clone())],
                );
            }
            HandshakeMessage::Certificate { context, entries } => {
                with_u8_length(out, |out| out.extend_from_slice(context));
                with_u24_length(out, |out| {
                    for entry in entries {
                        put_u24(out, entry.cert_data.len());
                        out.extend_from_slice(&entry.cert_data);
                        with_u16_length(out, |out| out.extend_from_slice(&entry.extensions));
                    }
                });
            }
            HandshakeMessage::CertificateVerify { scheme, signature } => {
                put_u16(out, scheme.to_u16());
                with_u16_length(out, |out| out.extend_from_slice(signature));
            }
            HandshakeMessage::Finished { verify_data } => out.extend_from_slice(verify_data),
            HandshakeMessage::KeyUpdate(request) => out.push(match request {
                KeyUpdateRequest::NotRequested => 0,
                KeyUpdateRequest::Requested => 1,
            }),
            HandshakeMessage::NewSessionTicket {
                lifetime,
                age_add,
                nonce,
                ticket,
            } => {
                out.extend_from_slice(&lifetime.to_be_bytes());
                out.extend_from_slice(&age_add.to_be_bytes());
                with_u8_length(out, |out| out.extend_from_slice(nonce));
                with_u16_length(out, |out| out.extend_from_slice(ticket));
                with_u16_length(out, |_| {});
            }
        }
    }

    /// Decodes one complete, framed handshake message.
    ///
    /// 解码一条完整的、带帧头的握手消息。
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let typ = r.u8("handshake type")?;
        let mut body = r.sub_u24("handshake body")?;
        r.finish("trailing bytes after handshake message")?;
        let typ = HandshakeType::from_u8(typ).ok_or(HandshakeError::UnexpectedMessage {
            message: "unknown handshake type",
            state: "any",
        })?;

        let message = match typ {
            HandshakeType::ClientHello => {
                let _legacy_version = body.u16("legacy_version")?;
                let random = body.array::<32>("random")?;
                let legacy_session_id = body.vec_u8("legacy_session_id")?;
                if legacy_session_id.len() > 32 {
                    return Err(HandshakeError::Decode("legacy_session_id too long"));
                }
                let suites = body.vec_u16("cipher_suites")?;
                if suites.is_empty() || suites.len() % 2 != 0 {
                    return Err(HandshakeError::Decode("cipher_suites"));
                }
                let cipher_suites = suites
                    .chunks_exact(2)
                    .map(|c| CipherSuite::from_u16(u16::from_be_bytes([c[0], c[1]])))
                    .collect();
                let compression_methods = body.vec_u8("compression_methods")?.to_vec();
                let extensions = decode_extensions(&mut body, ExtensionContext::ClientHello)?;
                HandshakeMessage::ClientHello(ClientHello {
                    random,
                    legacy_session_id: legacy_session_id.to_vec(),
                    cipher_suites,
                    compression_methods,
                    extensions,
                })
            }
            HandshakeType::ServerHello => {
                let _legacy_version = body.u16("legacy_version")?;
                let random = body.array::<32>("random")?;
                let legacy_session_id_echo = body.vec_u8("legacy_session_id_echo")?.to_vec();
                let cipher_suite = CipherSuite::from_u16(body.u16("cipher_suite")?);
                if body.u8("legacy_compression_method")? != 0 {
                    return Err(HandshakeError::IllegalParameter("non-null compression method"));
                }
                let context = if random == HELLO_RETRY_REQUEST_RANDOM {
                    ExtensionContext::HelloRetryRequest
                } else {
                    ExtensionContext::ServerHello
                };
                let extensions = decode_extensions(&mut body, context)?;
                HandshakeMessage::ServerHello(ServerHello {
                    random,
                    legacy_session_id_echo,
                    cipher_suite,
                    extensions,
                })
            }
            HandshakeType::EncryptedExtensions => HandshakeMessage::EncryptedExtensions(
                decode_extensions(&mut body, ExtensionContext::EncryptedExtensions)?,
            ),
            HandshakeType::CertificateRequest => {
                let context = body.vec_u8("certificate_request_context")?.to_vec();
                let extensions = decode_extensions(&mut body, ExtensionContext::CertificateRequest)?;
                let signature_algorithms = extensions
                    .into_iter()
                    .find_map(|e| match e {
                        Extension::SignatureAlgorithms(schemes) => Some(schemes),
                        _ => None,
                    })
                    .ok_or(HandshakeError::MissingExtension("signature_algorithms"))?;
                HandshakeMessage::CertificateRequest {
                    context,
                    signature_algorithms,
                }
            }
            HandshakeType::Certificate => {
                let context = body.vec_u8("certificate_request_context")?.to_vec();
                let mut list = body.sub_u24("certificate_list")?;
                let mut entries = Vec::new();
                while !list.is_empty() {
                    let cert_data = list.vec_u24("cert_data")?;
                    if cert_data.is_empty() {
                        return Err(HandshakeError::Decode("empty cert_data"));
                    }
                    let extensions = list.vec_u16("certificate entry extensions")?;
                    entries.push(CertificateEntry {
                        cert_data: cert_data.to_vec(),
                        extensions: extensions.to_vec(),
                    });
                }
                HandshakeMessage::Certificate { context, entries }
            }
            HandshakeType::CertificateVerify => {
                let scheme = SignatureScheme::from_u16(body.u16("signature scheme")?);
                let signature = body.vec_u16("signature")?.to_vec();
                HandshakeMessage::CertificateVerify { scheme, signature }
            }
            HandshakeType::Finished => HandshakeMessage::Finished {
                verify_data: body.rest().to_vec(),
            },
            HandshakeType::KeyUpdate => HandshakeMessage::KeyUpdate(match body.u8("key_update")? {
                0 => KeyUpdateRequest::NotRequested,
                1 => KeyUpdateRequest::Requested,
                _ => return Err(HandshakeError::IllegalParameter("key_update request value")),
            }),
            HandshakeType::NewSessionTicket => {
                let lifetime = u32::from_be_bytes(body.array::<4>("ticket_lifetime")?);
                let age_add = u32::from_be_bytes(body.array::<4>("ticket_age_add")?);
                let nonce = body.vec_u8("ticket_nonce")?.to_vec();
                let ticket = body.vec_u16("ticket")?.to_vec();
                if ticket.is_empty() {
                    return Err(HandshakeError::Decode("empty ticket"));
                }
                let _extensions = body.vec_u16("ticket extensions")?;
                HandshakeMessage::NewSessionTicket {
                    lifetime,
                    age_add,
                    nonce,
                    ticket,
                }
            }
        };
        body.finish("trailing bytes in handshake body")?;
        Ok(message)
    }
}

pub fn handshake_type_name(typ: HandshakeType) -> &'static str {
    match typ {
        HandshakeType::ClientHello => "ClientHello",
        HandshakeType::ServerHello => "ServerHello",
        HandshakeType::NewSessionTicket => "NewSessionTicket",
        HandshakeType::EncryptedExtensions => "EncryptedExtensions",
        HandshakeType::Certificate => "Certificate",
        HandshakeType::CertificateRequest => "CertificateRequest",
        HandshakeType::CertificateVerify => "CertificateVerify",
        HandshakeType::Finished => "Finished",
        HandshakeType::KeyUpdate => "KeyUpdate",
    }
}

/// Anything a connection can receive: the handshake messages plus the other
/// record content types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(HandshakeMessage),
    Alert(Alert),
    ApplicationData(Vec<u8>),
    ChangeCipherSpec,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Handshake(message) => message.name(),
            Message::Alert(_) => "Alert",
            Message::ApplicationData(_) => "ApplicationData",
            Message::ChangeCipherSpec => "ChangeCipherSpec",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suite::NamedGroup;
    use crate::protocol::extension::{KeyShareEntry, TLS13};

    #[test]
    fn certificate_body_layout() {
        let message = HandshakeMessage::Certificate {
            context: vec![],
            entries: vec![CertificateEntry {
                cert_data: vec![0xaa, 0xbb],
                extensions: vec![],
            }],
        };
        let bytes = message.encode();
        assert_eq!(
            bytes,
            [11, 0, 0, 11, 0, 0, 0, 7, 0, 0, 2, 0xaa, 0xbb, 0, 0]
        );
        assert_eq!(HandshakeMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn certificate_request_layout() {
        let message = HandshakeMessage::CertificateRequest {
            context: vec![],
            signature_algorithms: vec![SignatureScheme::Ed25519],
        };
        let bytes = message.encode();
        // context, extensions block with one signature_algorithms entry
        assert_eq!(bytes, [13, 0, 0, 11, 0, 0, 8, 0, 13, 0, 4, 0, 2, 8, 7]);
        assert_eq!(HandshakeMessage::decode(&bytes).unwrap(), message);

        let missing = [13, 0, 0, 3, 0, 0, 0];
        assert!(matches!(
            HandshakeMessage::decode(&missing),
            Err(HandshakeError::MissingExtension(_))
        ));
    }

    #[test]
    fn client_hello_reparses() {
        let message = HandshakeMessage::ClientHello(ClientHello {
            random: [3; 32],
            legacy_session_id: vec![4; 32],
            cipher_suites: vec![CipherSuite::TlsAes128GcmSha256],
            compression_methods: vec![0],
            extensions: vec![
                Extension::SupportedVersions(vec![TLS13]),
                Extension::KeyShares(vec![KeyShareEntry {
                    group: NamedGroup::X25519,
                    key_exchange: vec![1; 32],
                }]),
            ],
        });
        assert_eq!(HandshakeMessage::decode(&message.encode()).unwrap(), message);
    }

    #[test]
    fn hello_retry_request_is_recognised() {
        let message = HandshakeMessage::ServerHello(ServerHello {
            random: HELLO_RETRY_REQUEST_RANDOM,
            legacy_session_id_echo: vec![],
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            extensions: vec![Extension::Unknown {
                typ: 51,
                data: vec![0, 0x1d],
            }],
        });
        match HandshakeMessage::decode(&message.encode()).unwrap() {
            HandshakeMessage::ServerHello(hello) => assert!(hello.is_hello_retry_request()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_and_padded_messages_fail() {
        let bytes = HandshakeMessage::KeyUpdate(KeyUpdateRequest::Requested).encode();
        assert!(HandshakeMessage::decode(&bytes[..4]).is_err());
        let mut long = bytes.clone();
        long.push(0);
        assert!(HandshakeMessage::decode(&long).is_err());
        assert!(matches!(
            HandshakeMessage::decode(&[24, 0, 0, 1, 2]),
            Err(HandshakeError::IllegalParameter(_))
        ));
    }
}
