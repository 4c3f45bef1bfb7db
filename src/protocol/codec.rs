//! Bounds-checked reading and length-prefixed writing of TLS wire structures.
//!
//! Every length-prefixed vector is read through a sub-[`Reader`] limited to the
//! declared length, so a parser can never run past a boundary: running short
//! yields [`HandshakeError::Decode`] instead.
//!
//! TLS 线路结构的带边界检查读取与带长度前缀写入。
//!
//! 每个带长度前缀的向量都通过限定在声明长度内的子 [`Reader`] 读取，
//! 因此解析器不可能越界读取：长度不足时返回 [`HandshakeError::Decode`]。

use crate::error::{HandshakeError, Result};

/// A cursor over a byte slice that fails closed.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the unread bytes and advances to the end.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(HandshakeError::Decode(what));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self, what: &'static str) -> Result<usize> {
        let b = self.take(3, what)?;
        Ok(((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    pub fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    /// Reads a `u8`-length-prefixed opaque vector.
    pub fn vec_u8(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let len = self.u8(what)? as usize;
        self.take(len, what)
    }

    /// Reads a `u16`-length-prefixed opaque vector.
    pub fn vec_u16(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let len = self.u16(what)? as usize;
        self.take(len, what)
    }

    /// Reads a `u24`-length-prefixed opaque vector.
    pub fn vec_u24(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let len = self.u24(what)?;
        self.take(len, what)
    }

    /// A reader over a `u16`-length-prefixed region.
    pub fn sub_u16(&mut self, what: &'static str) -> Result<Reader<'a>> {
        self.vec_u16(what).map(Reader::new)
    }

    /// A reader over a `u24`-length-prefixed region.
    pub fn sub_u24(&mut self, what: &'static str) -> Result<Reader<'a>> {
        self.vec_u24(what).map(Reader::new)
    }

    /// Fails if any bytes remain unread.
    pub fn finish(&self, what: &'static str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(HandshakeError::Decode(what))
        }
    }
}

/// Appends a `u16` in network byte order.
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends a `u24` in network byte order. `value` must fit in 24 bits.
pub fn put_u24(out: &mut Vec<u8>, value: usize) {
    debug_assert!(value < 1 << 24);
    out.extend_from_slice(&[(value >> 16) as u8, (value >> 8) as u8, value as u8]);
}

/// Writes the body produced by `f` behind a one-byte length prefix.
pub fn with_u8_length(out: &mut Vec<u8>, f: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.push(0);
    f(out);
    let len = out.len() - start - 1;
    debug_assert!(len <= u8::MAX as usize);
    out[start] = len as u8;
}

/// Writes the body produced by `f` behind a two-byte length prefix.
pub fn with_u16_length(out: &mut Vec<u8>, f: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&[0, 0]);
    f(out);
    let len = out.len() - start - 2;
    debug_assert!(len <= u16::MAX as usize);
    out[start..start + 2].copy_from_slice(&(len as u16).to_be_bytes());
}

/// Writes the body produced by `f` behind a three-byte length prefix.
pub fn with_u24_length(out: &mut Vec<u8>, f: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&[0, 0, 0]);
    f(out);
    let len = out.len() - start - 3;
    debug_assert!(len < 1 << 24);
    out[start..start + 3].copy_from_slice(&[(len >> 16) as u8, (len >> 8) as u8, len as u8]);
}
