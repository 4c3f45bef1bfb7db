//! Manages the hashing of the handshake transcript.
//!
//! The hash function is only known once the cipher suite is chosen, so the
//! ClientHello bytes are buffered until [`Transcript::start_hash`] is called.
//! After that every message is absorbed immediately, byte for byte as it
//! appeared on the wire.
//!
//! 管理握手记录的哈希计算。
//!
//! 哈希函数要到密码套件选定后才确定，因此 ClientHello 的字节会被缓存，
//! 直到调用 [`Transcript::start_hash`]。此后每条消息都按其线路上的原始字节立即吸收。

use crate::crypto::hash::{HashAlgorithm, HashContext};
use crate::error::{HandshakeError, Result};

#[derive(Debug, Clone)]
enum Inner {
    Buffering(Vec<u8>),
    Hashing(HashContext),
}

#[derive(Debug, Clone)]
pub struct Transcript {
    inner: Inner,
}

impl Transcript {
    /// Creates a new, empty transcript.
    pub fn new() -> Self {
        Self {
            inner: Inner::Buffering(Vec::new()),
        }
    }

    /// Appends the exact wire bytes of one handshake message (header included).
    ///
    /// 追加一条握手消息的原始线路字节（包括消息头）。
    pub fn update(&mut self, message_bytes: &[u8]) {
        match &mut self.inner {
            Inner::Buffering(buffer) => buffer.extend_from_slice(message_bytes),
            Inner::Hashing(context) => context.update(message_bytes),
        }
    }

    /// Fixes the hash algorithm and absorbs everything buffered so far.
    pub fn start_hash(&mut self, algorithm: HashAlgorithm) -> Result<()> {
        let Inner::Buffering(buffer) = &self.inner else {
            return Err(HandshakeError::InvalidState);
        };
        let mut context = algorithm.context();
        context.update(buffer);
        self.inner = Inner::Hashing(context);
        Ok(())
    }

    /// Returns the current hash without consuming the transcript.
    ///
    /// 返回当前的哈希值，而不会消耗握手记录。
    pub fn current_hash(&self) -> Result<Vec<u8>> {
        match &self.inner {
            Inner::Hashing(context) => Ok(context.current()),
            Inner::Buffering(_) => Err(HandshakeError::InvalidState),
        }
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        match &self.inner {
            Inner::Hashing(context) => Some(context.algorithm()),
            Inner::Buffering(_) => None,
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
