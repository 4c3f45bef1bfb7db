//! Per-record protection: TLSInnerPlaintext framing and AEAD.
//!
//! ```text
//! TLSCiphertext = 23 || 0x0303 || length(2) || AEAD(content || type || zeros)
//! nonce         = iv XOR (0^32 || be64(sequence_number))
//! aad           = the five-byte outer header
//! ```
//!
//! 逐记录保护：TLSInnerPlaintext 帧格式与 AEAD。

use super::{ContentType, HEADER_LEN, LEGACY_RECORD_VERSION, MAX_CIPHERTEXT_LENGTH, MAX_PLAINTEXT_LENGTH};
use crate::crypto::aead::{AeadCipher, NONCE_LEN, TAG_LEN};
use crate::crypto::key_schedule::{TrafficSecret, derive_traffic_keys};
use crate::crypto::suite::CipherSuite;
use crate::error::{HandshakeError, Result};
use std::fmt;
use zeroize::Zeroize;

/// Key, IV and sequence number for one direction of one phase.
///
/// Re-keying replaces the whole value, so sequence numbers never carry over.
///
/// 一个阶段中一个方向的密钥、IV 与序列号。重新派生密钥时整体替换，序列号不会延续。
pub struct RecordKeys {
    cipher: AeadCipher,
    iv: [u8; NONCE_LEN],
    sequence_number: u64,
    suite: CipherSuite,
}

impl RecordKeys {
    pub fn new(suite: CipherSuite, key: &[u8], iv: [u8; NONCE_LEN]) -> Result<Self> {
        Ok(Self {
            cipher: AeadCipher::new(suite.aead()?, key)?,
            iv,
            sequence_number: 0,
            suite,
        })
    }

    /// Derives the key and IV for `secret` and starts at sequence number 0.
    pub fn from_traffic_secret(suite: CipherSuite, secret: &TrafficSecret) -> Result<Self> {
        let (key, iv) = derive_traffic_keys(secret, suite.aead()?.key_len())?;
        Self::new(suite, &key, iv)
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// The nonce the next record will use.
    pub fn next_nonce(&self) -> [u8; NONCE_LEN] {
        build_nonce(&self.iv, self.sequence_number)
    }

    #[cfg(test)]
    pub(crate) fn set_sequence_number(&mut self, sequence_number: u64) {
        self.sequence_number = sequence_number;
    }
}

impl Drop for RecordKeys {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl fmt::Debug for RecordKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordKeys")
            .field("suite", &self.suite)
            .field("sequence_number", &self.sequence_number)
            .finish_non_exhaustive()
    }
}

/// Per-record nonce: the sequence number is XORed into the low eight bytes.
pub fn build_nonce(iv: &[u8; NONCE_LEN], sequence_number: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *iv;
    for (n, s) in nonce[NONCE_LEN - 8..].iter_mut().zip(sequence_number.to_be_bytes()) {
        *n ^= s;
    }
    nonce
}

fn inner_len(plaintext_len: usize, padding: usize) -> Result<usize> {
    if plaintext_len > MAX_PLAINTEXT_LENGTH {
        return Err(HandshakeError::PlaintextTooLarge(plaintext_len));
    }
    let inner = plaintext_len + 1 + padding;
    if inner > MAX_PLAINTEXT_LENGTH + 1 {
        return Err(HandshakeError::PlaintextTooLarge(inner));
    }
    Ok(inner)
}

/// Number of bytes [`encrypt_into`] writes for these inputs.
pub fn protected_len(plaintext_len: usize, padding: usize) -> Result<usize> {
    Ok(HEADER_LEN + inner_len(plaintext_len, padding)? + TAG_LEN)
}

/// Protects `plaintext` into a complete record with no padding.
pub fn encrypt(plaintext: &[u8], content_type: ContentType, keys: &mut RecordKeys) -> Result<Vec<u8>> {
    encrypt_padded(plaintext, content_type, keys, 0)
}

/// Protects `plaintext` into a complete record, appending `padding` zero bytes
/// after the content type.
pub fn encrypt_padded(
    plaintext: &[u8],
    content_type: ContentType,
    keys: &mut RecordKeys,
    padding: usize,
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; protected_len(plaintext.len(), padding)?];
    let written = encrypt_into(plaintext, content_type, keys, padding, &mut out)?;
    out.truncate(written);
    Ok(out)
}

/// Protects `plaintext` into `out`, returning the number of bytes written.
///
/// Fails with [`HandshakeError::BufferTooSmall`] before touching the keys when
/// `out` cannot hold the record.
///
/// 将 `plaintext` 加密写入 `out`，返回写入的字节数。
pub fn encrypt_into(
    plaintext: &[u8],
    content_type: ContentType,
    keys: &mut RecordKeys,
    padding: usize,
    out: &mut [u8],
) -> Result<usize> {
    let inner = inner_len(plaintext.len(), padding)?;
    let needed = HEADER_LEN + inner + TAG_LEN;
    if out.len() < needed {
        return Err(HandshakeError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }
    if keys.sequence_number == u64::MAX {
        return Err(HandshakeError::SequenceExhausted);
    }

    let body_len = (inner + TAG_LEN) as u16;
    let [v0, v1] = LEGACY_RECORD_VERSION.to_be_bytes();
    let [l0, l1] = body_len.to_be_bytes();
    let header = [ContentType::ApplicationData as u8, v0, v1, l0, l1];
    out[..HEADER_LEN].copy_from_slice(&header);

    let (body, tag_out) = out[HEADER_LEN..needed].split_at_mut(inner);
    body[..plaintext.len()].copy_from_slice(plaintext);
    body[plaintext.len()] = content_type as u8;
    body[plaintext.len() + 1..].fill(0);

    let nonce = keys.next_nonce();
    let tag = keys.cipher.seal_in_place(&nonce, &header, body)?;
    tag_out.copy_from_slice(&tag);
    keys.sequence_number += 1;
    Ok(needed)
}

/// Opens one complete protected record.
///
/// Returns the content and its true content type with padding removed.
/// Authentication failures are all reported as [`HandshakeError::BadRecordMac`].
///
/// 打开一条完整的受保护记录，返回去除填充后的内容及其真实内容类型。
pub fn decrypt(record: &[u8], keys: &mut RecordKeys) -> Result<(Vec<u8>, ContentType)> {
    if record.len() < HEADER_LEN {
        return Err(HandshakeError::Decode("truncated record header"));
    }
    let (header, body) = record.split_at(HEADER_LEN);
    if header[0] != ContentType::ApplicationData as u8 {
        return Err(HandshakeError::Decode("protected record must be application_data"));
    }
    let declared = u16::from_be_bytes([header[3], header[4]]) as usize;
    if declared > MAX_CIPHERTEXT_LENGTH {
        return Err(HandshakeError::RecordOverflow);
    }
    if declared != body.len() {
        return Err(HandshakeError::Decode("record length does not match header"));
    }
    if body.len() < TAG_LEN + 1 {
        return Err(HandshakeError::BadRecordMac);
    }
    if keys.sequence_number == u64::MAX {
        return Err(HandshakeError::SequenceExhausted);
    }

    let (ciphertext, tag) = body.split_at(body.len() - TAG_LEN);
    let mut plaintext = ciphertext.to_vec();
    let nonce = keys.next_nonce();
    keys.cipher.open_in_place(&nonce, header, &mut plaintext, tag)?;
    keys.sequence_number += 1;

    if plaintext.len() > MAX_PLAINTEXT_LENGTH + 1 {
        return Err(HandshakeError::RecordOverflow);
    }
    let Some(type_pos) = plaintext.iter().rposition(|&b| b != 0) else {
        return Err(HandshakeError::UnexpectedMessage {
            message: "record without content type",
            state: "record layer",
        });
    };
    let content_type =
        ContentType::from_u8(plaintext[type_pos]).ok_or(HandshakeError::UnexpectedMessage {
            message: "unknown inner content type",
            state: "record layer",
        })?;
    plaintext.truncate(type_pos);
    Ok((plaintext, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(suite: CipherSuite) -> RecordKeys {
        let key = vec![0x11; suite.aead().unwrap().key_len()];
        RecordKeys::new(suite, &key, [0x22; 12]).unwrap()
    }

    #[test]
    fn nonce_only_touches_low_eight_bytes() {
        let iv = [0xff; 12];
        assert_eq!(build_nonce(&iv, 0), iv);
        let nonce = build_nonce(&iv, u64::MAX);
        assert_eq!(&nonce[..4], &[0xff; 4]);
        assert_eq!(&nonce[4..], &[0; 8]);
    }

    #[test]
    fn padding_is_stripped() {
        let mut tx = keys(CipherSuite::TlsAes256GcmSha384);
        let mut rx = keys(CipherSuite::TlsAes256GcmSha384);
        let record = encrypt_padded(b"hi", ContentType::Handshake, &mut tx, 100).unwrap();
        assert_eq!(record.len(), HEADER_LEN + 2 + 1 + 100 + TAG_LEN);
        let (plaintext, content_type) = decrypt(&record, &mut rx).unwrap();
        assert_eq!(plaintext, b"hi");
        assert_eq!(content_type, ContentType::Handshake);
    }

    #[test]
    fn all_zero_inner_plaintext_is_unexpected() {
        let mut tx = keys(CipherSuite::TlsAes128GcmSha256);
        let mut rx = keys(CipherSuite::TlsAes128GcmSha256);
        // Build a record whose inner plaintext is only zeros.
        let mut record = encrypt(&[], ContentType::ApplicationData, &mut tx).unwrap();
        let mut tx_zero = keys(CipherSuite::TlsAes128GcmSha256);
        let header: [u8; 5] = record[..5].try_into().unwrap();
        let mut body = [0u8; 1];
        let tag = tx_zero.cipher.seal_in_place(&tx_zero.next_nonce(), &header, &mut body).unwrap();
        record.truncate(5);
        record.extend_from_slice(&body);
        record.extend_from_slice(&tag);
        assert!(matches!(
            decrypt(&record, &mut rx),
            Err(HandshakeError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn oversized_plaintext_rejected_before_crypto() {
        let mut tx = keys(CipherSuite::TlsChaCha20Poly1305Sha256);
        let big = vec![0u8; MAX_PLAINTEXT_LENGTH + 1];
        assert!(matches!(
            encrypt(&big, ContentType::ApplicationData, &mut tx),
            Err(HandshakeError::PlaintextTooLarge(_))
        ));
        assert_eq!(tx.sequence_number(), 0);
        assert!(encrypt_padded(&[1; 16384], ContentType::ApplicationData, &mut tx, 1).is_err());
    }

    #[test]
    fn encrypt_into_reports_short_buffers() {
        let mut tx = keys(CipherSuite::TlsAes128GcmSha256);
        let mut out = [0u8; 10];
        assert!(matches!(
            encrypt_into(b"hello", ContentType::ApplicationData, &mut tx, 0, &mut out),
            Err(HandshakeError::BufferTooSmall { needed: 27, available: 10 })
        ));
        assert_eq!(tx.sequence_number(), 0);
    }

    #[test]
    fn exhausted_sequence_refuses_to_encrypt() {
        let mut tx = keys(CipherSuite::TlsAes128GcmSha256);
        tx.set_sequence_number(u64::MAX);
        assert!(matches!(
            encrypt(b"x", ContentType::ApplicationData, &mut tx),
            Err(HandshakeError::SequenceExhausted)
        ));
    }

    #[test]
    fn overflowing_length_is_rejected() {
        let mut rx = keys(CipherSuite::TlsAes128GcmSha256);
        let mut record = vec![23, 3, 3];
        record.extend_from_slice(&((MAX_CIPHERTEXT_LENGTH + 1) as u16).to_be_bytes());
        record.resize(HEADER_LEN + MAX_CIPHERTEXT_LENGTH + 1, 0);
        assert!(matches!(decrypt(&record, &mut rx), Err(HandshakeError::RecordOverflow)));
    }
}
