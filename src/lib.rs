//! A TLS 1.3 engine: client and server handshake state machines, the HKDF key
//! schedule and the AEAD record layer, with optional client authentication and
//! a hybrid X25519/ML-KEM-768 key exchange.
//!
//! The engine performs no I/O. Callers feed bytes read from the transport into
//! [`HandshakeClient::process`] or [`HandshakeServer::process`] and write back
//! whatever they return.
//!
//! 一个 TLS 1.3 引擎：客户端与服务器握手状态机、HKDF 密钥调度以及 AEAD 记录层，
//! 支持可选的客户端认证与 X25519/ML-KEM-768 混合密钥交换。引擎本身不做任何 I/O。

pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod record;
pub mod verify;

pub use config::{CertifiedKey, ClientAuthMode, ClientConfig, ServerConfig};
pub use crypto::suite::{CipherSuite, NamedGroup, ProtocolSuite, SignatureScheme};
pub use error::{ErrorKind, HandshakeError, Result};
pub use handshake::Progress;
pub use handshake::client::HandshakeClient;
pub use handshake::server::HandshakeServer;
pub use protocol::alert::AlertDescription;
pub use protocol::state::{ClientState, ServerState};
pub use verify::{CertificateVerdict, CertificateVerifier, TrustAnchorVerifier};
