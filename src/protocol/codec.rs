//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.
//! Every frame is `[tag] length payload`, where the 4-byte length counts
//! itself but not the tag. Only StartupMessage and SSLRequest omit the tag.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};

use crate::error::{Error, Result};

/// Size of the tag byte plus the length field.
pub const HEADER_LEN: usize = 5;

fn truncated(what: &str, need: usize, have: usize) -> Error {
    Error::MalformedFrame(format!("{what}: buffer too short: {have} < {need}"))
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(truncated("read_u8", 1, 0)),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (value, rest) =
        I16BE::read_from_prefix(data).map_err(|_| truncated("read_i16", 2, data.len()))?;
    Ok((value.get(), rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (value, rest) =
        U16BE::read_from_prefix(data).map_err(|_| truncated("read_u16", 2, data.len()))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (value, rest) =
        I32BE::read_from_prefix(data).map_err(|_| truncated("read_i32", 4, data.len()))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) =
        U32BE::read_from_prefix(data).map_err(|_| truncated("read_u32", 4, data.len()))?;
    Ok((value.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len)
        .ok_or_else(|| truncated("read_bytes", len, data.len()))
}

/// Read null-terminated string (PostgreSQL String type).
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::MalformedFrame(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::MalformedFrame(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Read a sequence of null-terminated strings ending with an empty one.
pub fn read_multi_cstr(data: &[u8]) -> Result<(Vec<&str>, &[u8])> {
    let mut items = Vec::new();
    let mut rest = data;
    loop {
        let (item, remaining) = read_cstr(rest)?;
        rest = remaining;
        if item.is_empty() {
            return Ok((items, rest));
        }
        items.push(item);
    }
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string (PostgreSQL String type).
#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    write_cstring(out, s.as_bytes());
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Start building a startup message (no type byte).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Get mutable access to the underlying buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

/// One length-prefixed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type byte, absent for StartupMessage and SSLRequest
    pub tag: Option<u8>,
    /// Bytes after the length field
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a tagged frame.
    pub fn new(tag: u8, payload: Vec<u8>) -> Self {
        Self {
            tag: Some(tag),
            payload,
        }
    }

    /// Create a frame without a tag byte.
    pub fn untagged(payload: Vec<u8>) -> Self {
        Self { tag: None, payload }
    }

    /// Value of the length field: payload length plus the field itself.
    pub fn length(&self) -> u32 {
        (self.payload.len() + 4) as u32
    }

    /// Append the wire form of this frame to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        if let Some(tag) = self.tag {
            write_u8(out, tag);
        }
        write_u32(out, self.length());
        write_bytes(out, &self.payload);
    }

    /// Decode one tagged frame from the front of `data`.
    ///
    /// Returns `Ok(None)` until the whole frame is buffered, otherwise the
    /// frame and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<Option<(Frame, usize)>> {
        if data.len() < HEADER_LEN {
            return Ok(None);
        }
        let (tag, rest) = read_u8(data)?;
        let Some(end) = frame_end(rest)? else {
            return Ok(None);
        };
        let payload = rest[4..end].to_vec();
        Ok(Some((Frame::new(tag, payload), end + 1)))
    }

    /// Decode one untagged (startup-style) frame from the front of `data`.
    pub fn decode_untagged(data: &[u8]) -> Result<Option<(Frame, usize)>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let Some(end) = frame_end(data)? else {
            return Ok(None);
        };
        Ok(Some((Frame::untagged(data[4..end].to_vec()), end)))
    }
}

/// Validate the length field at the front of `data` and return where the
/// frame ends, or `None` if more bytes are needed.
fn frame_end(data: &[u8]) -> Result<Option<usize>> {
    let (len, _) = read_i32(data)?;
    if len < 4 {
        return Err(Error::MalformedFrame(format!(
            "declared length {len} is below 4"
        )));
    }
    let end = len as usize;
    if data.len() < end {
        return Ok(None);
    }
    Ok(Some(end))
}
