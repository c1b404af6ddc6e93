//! Bound argument values for prepared statement execution.
//!
//! Strings travel in text format. Integers, booleans and NULL travel in
//! binary format. Before Bind, [`Param::coerce`] fits each argument to the
//! parameter type the server described, so integer widths always match.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_i32, write_i32};
use crate::protocol::types::{FormatCode, Oid, oid};

/// One argument bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// SQL NULL
    Null,
    /// Boolean, one binary byte
    Bool(bool),
    /// 16-bit integer, two binary bytes
    Int2(i16),
    /// 32-bit integer, four binary bytes
    Int4(i32),
    /// 64-bit integer, eight binary bytes
    Int8(i64),
    /// Text sent as-is in text format
    Text(String),
}

impl Param {
    /// Format code announced in the Bind message.
    pub fn format(&self) -> FormatCode {
        match self {
            Param::Text(_) => FormatCode::Text,
            _ => FormatCode::Binary,
        }
    }

    /// Fit this argument to a parameter of type `target`.
    ///
    /// Integers are resized to `int2`/`int4`/`int8` with a range check and
    /// sent as text to text and float parameters. Text and NULL fit any
    /// type; the server parses text itself. `target` 0 leaves the value as is.
    pub fn coerce(self, target: Oid) -> Result<Param> {
        if target == 0 {
            return Ok(self);
        }
        match self {
            Param::Null | Param::Text(_) => Ok(self),
            Param::Bool(v) => match target {
                oid::BOOL => Ok(Param::Bool(v)),
                oid::TEXT | oid::VARCHAR => Ok(Param::Text(v.to_string())),
                _ => Err(mismatch("bool", target)),
            },
            Param::Int2(v) => coerce_int(i64::from(v), "int2", target),
            Param::Int4(v) => coerce_int(i64::from(v), "int4", target),
            Param::Int8(v) => coerce_int(v, "int8", target),
        }
    }

    /// Write the length-prefixed value (`-1` for NULL).
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Param::Null => write_i32(out, -1),
            Param::Bool(v) => {
                write_i32(out, 1);
                out.push(u8::from(*v));
            }
            Param::Int2(v) => {
                write_i32(out, 2);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Param::Int4(v) => {
                write_i32(out, 4);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Param::Int8(v) => {
                write_i32(out, 8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Param::Text(s) => {
                write_i32(out, s.len() as i32);
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Read one length-prefixed value written by [`Param::encode`].
    pub fn decode(format: FormatCode, data: &[u8]) -> Result<(Param, &[u8])> {
        let (len, rest) = read_i32(data)?;
        if len == -1 {
            return Ok((Param::Null, rest));
        }
        if len < 0 {
            return Err(Error::MalformedFrame(format!("negative value length {len}")));
        }
        let (bytes, rest) = read_bytes(rest, len as usize)?;
        let param = match format {
            FormatCode::Text => Param::Text(
                simdutf8::compat::from_utf8(bytes)
                    .map_err(|e| Error::MalformedFrame(format!("bind value: {e}")))?
                    .to_string(),
            ),
            FormatCode::Binary => match *bytes {
                [b] => Param::Bool(b != 0),
                [a, b] => Param::Int2(i16::from_be_bytes([a, b])),
                [a, b, c, d] => Param::Int4(i32::from_be_bytes([a, b, c, d])),
                [a, b, c, d, e, f, g, h] => {
                    Param::Int8(i64::from_be_bytes([a, b, c, d, e, f, g, h]))
                }
                _ => {
                    return Err(Error::MalformedFrame(format!(
                        "unsupported binary value width {len}"
                    )));
                }
            },
        };
        Ok((param, rest))
    }
}

fn coerce_int(value: i64, from: &str, target: Oid) -> Result<Param> {
    let out_of_range =
        || Error::InvalidUsage(format!("{value} is out of range for parameter type {target}"));
    match target {
        oid::INT2 => i16::try_from(value)
            .map(Param::Int2)
            .map_err(|_| out_of_range()),
        oid::INT4 => i32::try_from(value)
            .map(Param::Int4)
            .map_err(|_| out_of_range()),
        oid::INT8 => Ok(Param::Int8(value)),
        oid::TEXT | oid::VARCHAR | oid::FLOAT4 | oid::FLOAT8 => Ok(Param::Text(value.to_string())),
        _ => Err(mismatch(from, target)),
    }
}

fn mismatch(from: &str, target: Oid) -> Error {
    Error::InvalidUsage(format!("cannot bind {from} to parameter of type {target}"))
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<i16> for Param {
    fn from(value: i16) -> Self {
        Param::Int2(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int4(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int8(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}
