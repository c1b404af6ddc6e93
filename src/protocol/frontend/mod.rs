//! PostgreSQL frontend (client → server) messages.

pub mod auth;
pub mod extended;
pub mod simple;
pub mod startup;

pub use auth::{md5_hex, md5_password, write_password};
pub use extended::{
    DescribeTarget, write_bind, write_describe, write_execute, write_flush, write_parse,
    write_sync,
};
pub use simple::write_query;
pub use startup::{write_ssl_request, write_startup, write_terminate};

use crate::error::{Error, Result};
use crate::params::Param;
use crate::protocol::codec::{Frame, read_cstr, read_i16, read_i32, read_u8, read_u32};
use crate::protocol::types::{FormatCode, Oid};

/// Frontend message type bytes.
pub mod msg_type {
    /// Password response
    pub const PASSWORD: u8 = b'p';
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Parse (extended query protocol)
    pub const PARSE: u8 = b'P';
    /// Bind (extended query protocol)
    pub const BIND: u8 = b'B';
    /// Execute (extended query protocol)
    pub const EXECUTE: u8 = b'E';
    /// Describe (extended query protocol)
    pub const DESCRIBE: u8 = b'D';
    /// Sync (extended query protocol)
    pub const SYNC: u8 = b'S';
    /// Flush (extended query protocol)
    pub const FLUSH: u8 = b'H';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Owned form of every message the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// StartupMessage with its (name, value) parameters
    Startup(Vec<(String, String)>),
    SslRequest,
    Query(String),
    Parse {
        name: String,
        query: String,
        param_types: Vec<Oid>,
    },
    Bind {
        portal: String,
        statement: String,
        params: Vec<Param>,
    },
    Describe {
        target: DescribeTarget,
        name: String,
    },
    Execute {
        portal: String,
        max_rows: u32,
    },
    Flush,
    Sync,
    Terminate,
    Password(String),
}

impl FrontendMessage {
    /// Append the wire form of this message to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) {
        match self {
            FrontendMessage::Startup(params) => {
                let pairs: Vec<(&str, &str)> = params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                write_startup(buf, &pairs);
            }
            FrontendMessage::SslRequest => write_ssl_request(buf),
            FrontendMessage::Query(sql) => write_query(buf, sql),
            FrontendMessage::Parse {
                name,
                query,
                param_types,
            } => write_parse(buf, name, query, param_types),
            FrontendMessage::Bind {
                portal,
                statement,
                params,
            } => write_bind(buf, portal, statement, params),
            FrontendMessage::Describe { target, name } => write_describe(buf, *target, name),
            FrontendMessage::Execute { portal, max_rows } => write_execute(buf, portal, *max_rows),
            FrontendMessage::Flush => write_flush(buf),
            FrontendMessage::Sync => write_sync(buf),
            FrontendMessage::Terminate => write_terminate(buf),
            FrontendMessage::Password(password) => write_password(buf, password),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Startup(_) => "StartupMessage",
            FrontendMessage::SslRequest => "SSLRequest",
            FrontendMessage::Query(_) => "Query",
            FrontendMessage::Parse { .. } => "Parse",
            FrontendMessage::Bind { .. } => "Bind",
            FrontendMessage::Describe { .. } => "Describe",
            FrontendMessage::Execute { .. } => "Execute",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Terminate => "Terminate",
            FrontendMessage::Password(_) => "PasswordMessage",
        }
    }

    /// Decode a frame produced by [`FrontendMessage::write`].
    pub fn parse(frame: &Frame) -> Result<Self> {
        let payload = frame.payload.as_slice();
        let Some(tag) = frame.tag else {
            return parse_untagged(payload);
        };
        let message = match tag {
            msg_type::QUERY => FrontendMessage::Query(read_cstr(payload)?.0.to_string()),
            msg_type::PASSWORD => FrontendMessage::Password(read_cstr(payload)?.0.to_string()),
            msg_type::PARSE => {
                let (name, rest) = read_cstr(payload)?;
                let (query, rest) = read_cstr(rest)?;
                let (count, mut rest) = read_i16(rest)?;
                let mut param_types = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    let (oid, remaining) = read_u32(rest)?;
                    param_types.push(oid);
                    rest = remaining;
                }
                FrontendMessage::Parse {
                    name: name.to_string(),
                    query: query.to_string(),
                    param_types,
                }
            }
            msg_type::BIND => parse_bind(payload)?,
            msg_type::DESCRIBE => {
                let (target, rest) = read_u8(payload)?;
                let target = DescribeTarget::from_byte(target).ok_or_else(|| {
                    Error::MalformedFrame(format!("unknown describe target {target:#04x}"))
                })?;
                FrontendMessage::Describe {
                    target,
                    name: read_cstr(rest)?.0.to_string(),
                }
            }
            msg_type::EXECUTE => {
                let (portal, rest) = read_cstr(payload)?;
                FrontendMessage::Execute {
                    portal: portal.to_string(),
                    max_rows: read_u32(rest)?.0,
                }
            }
            msg_type::FLUSH => FrontendMessage::Flush,
            msg_type::SYNC => FrontendMessage::Sync,
            msg_type::TERMINATE => FrontendMessage::Terminate,
            other => {
                return Err(Error::MalformedFrame(format!(
                    "unknown frontend message tag {:?}",
                    other as char
                )));
            }
        };
        Ok(message)
    }
}

fn parse_untagged(payload: &[u8]) -> Result<FrontendMessage> {
    let (code, mut rest) = read_i32(payload)?;
    match code {
        startup::SSL_REQUEST_CODE => Ok(FrontendMessage::SslRequest),
        startup::PROTOCOL_VERSION_3_0 => {
            let mut params = Vec::new();
            loop {
                let (name, remaining) = read_cstr(rest)?;
                if name.is_empty() {
                    return Ok(FrontendMessage::Startup(params));
                }
                let (value, remaining) = read_cstr(remaining)?;
                params.push((name.to_string(), value.to_string()));
                rest = remaining;
            }
        }
        other => Err(Error::MalformedFrame(format!(
            "unknown untagged request code {other}"
        ))),
    }
}

fn parse_bind(payload: &[u8]) -> Result<FrontendMessage> {
    let (portal, rest) = read_cstr(payload)?;
    let (statement, rest) = read_cstr(rest)?;

    let (format_count, mut rest) = read_i16(rest)?;
    let mut formats = Vec::with_capacity(format_count.max(0) as usize);
    for _ in 0..format_count {
        let (code, remaining) = read_i16(rest)?;
        formats.push(FormatCode::from_u16(code as u16));
        rest = remaining;
    }

    let (value_count, mut rest) = read_i16(rest)?;
    let mut params = Vec::with_capacity(value_count.max(0) as usize);
    for i in 0..value_count.max(0) as usize {
        let format = match formats.len() {
            0 => FormatCode::Text,
            1 => formats[0],
            _ => formats.get(i).copied().unwrap_or_default(),
        };
        let (param, remaining) = Param::decode(format, rest)?;
        params.push(param);
        rest = remaining;
    }

    Ok(FrontendMessage::Bind {
        portal: portal.to_string(),
        statement: statement.to_string(),
        params,
    })
}
