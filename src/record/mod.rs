//! The TLS 1.3 record layer.
//!
//! [`protection`] holds the pure per-record AEAD operations; [`layer`] adds the
//! stream handling around them: deframing, fragmentation and key installation.
//!
//! TLS 1.3 记录层。[`protection`] 包含纯粹的逐记录 AEAD 操作；
//! [`layer`] 在其外围提供流处理：拆帧、分片与密钥安装。

pub mod layer;
pub mod protection;

pub use layer::{Record, RecordLayer};
pub use protection::{RecordKeys, build_nonce, decrypt, encrypt, encrypt_into, encrypt_padded};

pub const HEADER_LEN: usize = 5;
/// Largest plaintext fragment (2^14).
pub const MAX_PLAINTEXT_LENGTH: usize = 16384;
/// Largest protected record body (2^14 + 256).
pub const MAX_CIPHERTEXT_LENGTH: usize = MAX_PLAINTEXT_LENGTH + 256;
pub const LEGACY_RECORD_VERSION: u16 = 0x0303;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}
