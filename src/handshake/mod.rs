//! Client and server connection contexts.
//!
//! Both roles share one calling convention: feed bytes read from the transport
//! into `process`, write `Progress::to_send` back to it, and consume any
//! application data that arrived.
//!
//! 客户端与服务器连接上下文。两种角色使用同一调用约定：把从传输层读到的字节交给
//! `process`，把 `Progress::to_send` 写回传输层，并消费收到的应用数据。

pub mod client;
pub(crate) mod common;
pub mod server;

/// The result of one `process` call.
///
/// 一次 `process` 调用的结果。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Bytes to write to the transport, possibly empty.
    pub to_send: Vec<u8>,
    /// Application data records received, in order.
    pub application_data: Vec<Vec<u8>>,
    /// Set when this call completed the handshake.
    pub handshake_complete: bool,
    /// Set when the peer sent close_notify.
    pub peer_closed: bool,
}
