//! Stream-level record handling.
//!
//! [`RecordLayer`] accepts arbitrary chunks of transport bytes, yields whole
//! records (decrypting them once read keys are installed), and frames
//! outbound content into records no larger than 2^14 bytes of plaintext.
//!
//! 流级别的记录处理。[`RecordLayer`] 接收任意分块的传输字节，产出完整记录
//! （安装读密钥后负责解密），并把出站内容切分为明文不超过 2^14 字节的记录。

use super::protection::{self, RecordKeys};
use super::{ContentType, HEADER_LEN, LEGACY_RECORD_VERSION, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH};
use crate::error::{HandshakeError, Result};
use tracing::trace;

/// One deframed (and, if keys are installed, decrypted) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub content_type: ContentType,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct RecordLayer {
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
    read_keys: Option<RecordKeys>,
    write_keys: Option<RecordKeys>,
    padding: usize,
    /// Set until the handshake completes. Meanwhile plaintext ChangeCipherSpec
    /// records are dropped and plaintext alerts are still accepted, since the
    /// peer may fail before it has keys of its own.
    handshaking: bool,
}

impl RecordLayer {
    /// `padding` zero bytes are added to every protected record.
    pub fn new(padding: usize) -> Self {
        Self {
            incoming: Vec::new(),
            outgoing: Vec::new(),
            read_keys: None,
            write_keys: None,
            padding,
            handshaking: true,
        }
    }

    pub fn set_read_keys(&mut self, keys: RecordKeys) {
        trace!(suite = ?keys.suite(), "installing read keys");
        self.read_keys = Some(keys);
    }

    pub fn set_write_keys(&mut self, keys: RecordKeys) {
        trace!(suite = ?keys.suite(), "installing write keys");
        self.write_keys = Some(keys);
    }

    pub fn has_read_keys(&self) -> bool {
        self.read_keys.is_some()
    }

    pub fn has_write_keys(&self) -> bool {
        self.write_keys.is_some()
    }

    /// Stops tolerating middlebox ChangeCipherSpec records and plaintext alerts.
    pub fn handshake_complete(&mut self) {
        self.handshaking = false;
    }

    /// Buffers bytes read from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }

    /// Bytes received but not yet forming a whole record.
    pub fn buffered_len(&self) -> usize {
        self.incoming.len()
    }

    /// Returns the next complete record, or `None` if more bytes are needed.
    ///
    /// The header is validated before the body is awaited, so an oversized
    /// length fails immediately.
    ///
    /// 返回下一条完整记录；若需要更多字节则返回 `None`。
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.incoming.len() < HEADER_LEN {
                return Ok(None);
            }
            let content_type =
                ContentType::from_u8(self.incoming[0]).ok_or(HandshakeError::UnexpectedMessage {
                    message: "unknown record content type",
                    state: "record layer",
                })?;
            let version = u16::from_be_bytes([self.incoming[1], self.incoming[2]]);
            if version != LEGACY_RECORD_VERSION && version != 0x0301 {
                return Err(HandshakeError::Decode("record legacy_version"));
            }
            let len = u16::from_be_bytes([self.incoming[3], self.incoming[4]]) as usize;
            let protected =
                self.read_keys.is_some() && content_type == ContentType::ApplicationData;
            let limit = if protected {
                MAX_CIPHERTEXT_LENGTH
            } else {
                MAX_PLAINTEXT_LENGTH
            };
            if len > limit {
                return Err(HandshakeError::RecordOverflow);
            }
            if self.incoming.len() < HEADER_LEN + len {
                return Ok(None);
            }
            let raw: Vec<u8> = self.incoming.drain(..HEADER_LEN + len).collect();
            let payload = &raw[HEADER_LEN..];

            if content_type == ContentType::ChangeCipherSpec {
                if self.handshaking && payload == [1] {
                    trace!("discarding compatibility ChangeCipherSpec");
                    continue;
                }
                return Err(HandshakeError::UnexpectedMessage {
                    message: "ChangeCipherSpec",
                    state: "record layer",
                });
            }

            let record = match self.read_keys.as_mut() {
                Some(_) if content_type == ContentType::Alert && self.handshaking => {
                    trace!("plaintext alert during the handshake");
                    Record {
                        content_type,
                        payload: payload.to_vec(),
                    }
                }
                Some(keys) => {
                    if content_type != ContentType::ApplicationData {
                        return Err(HandshakeError::UnexpectedMessage {
                            message: "plaintext record after keys were installed",
                            state: "record layer",
                        });
                    }
                    let (payload, content_type) = protection::decrypt(&raw, keys)?;
                    trace!(?content_type, len = payload.len(), "record decrypted");
                    Record {
                        content_type,
                        payload,
                    }
                }
                None => {
                    if content_type == ContentType::ApplicationData {
                        return Err(HandshakeError::UnexpectedMessage {
                            message: "application data before keys",
                            state: "record layer",
                        });
                    }
                    Record {
                        content_type,
                        payload: payload.to_vec(),
                    }
                }
            };
            if record.content_type == ContentType::Handshake && record.payload.is_empty() {
                return Err(HandshakeError::Decode("zero-length handshake record"));
            }
            return Ok(Some(record));
        }
    }

    /// Frames `data` into one or more records and queues them for sending.
    ///
    /// 把 `data` 切分为一条或多条记录并加入发送队列。
    pub fn write(&mut self, content_type: ContentType, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return self.write_fragment(content_type, data);
        }
        for fragment in data.chunks(MAX_PLAINTEXT_LENGTH) {
            self.write_fragment(content_type, fragment)?;
        }
        Ok(())
    }

    fn write_fragment(&mut self, content_type: ContentType, fragment: &[u8]) -> Result<()> {
        match self.write_keys.as_mut() {
            Some(keys) => {
                let padding = self
                    .padding
                    .min(MAX_PLAINTEXT_LENGTH - fragment.len());
                let record = protection::encrypt_padded(fragment, content_type, keys, padding)?;
                trace!(?content_type, len = fragment.len(), seq = keys.sequence_number(), "record sealed");
                self.outgoing.extend_from_slice(&record);
            }
            None => {
                self.outgoing.push(content_type as u8);
                self.outgoing.extend_from_slice(&LEGACY_RECORD_VERSION.to_be_bytes());
                self.outgoing.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
                self.outgoing.extend_from_slice(fragment);
            }
        }
        Ok(())
    }

    /// Drains everything queued for the transport.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    /// Drops both directions' keys and all buffered data.
    pub fn clear(&mut self) {
        self.read_keys = None;
        self.write_keys = None;
        self.incoming.clear();
        self.outgoing.clear();
    }
}
