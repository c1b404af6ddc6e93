//! PostgreSQL backend (server → client) messages.
//!
//! Payload parsers live in the submodules; [`parse_response`] turns a frame
//! into an owned [`Event`] that the state machines route by [`EventKind`].

pub mod auth;
pub mod error;
pub mod extended;
pub mod query;

pub use auth::{
    AuthenticationMessage, BackendKeyData, NotificationResponse, ParameterStatus, ReadyForQuery,
};
pub use error::{parse_fields, write_fields};
pub use extended::{parse_parameter_description, write_parameter_description};
pub use query::{
    CommandComplete, FieldDescriptor, parse_data_row, parse_row_description, write_data_row,
    write_row_description,
};

use crate::error::{ErrorFields, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{Oid, TransactionStatus};

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMd5Password {
        salt: [u8; 4],
    },
    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    ParameterStatus {
        name: String,
        value: String,
    },
    BackendKeyData {
        process_id: u32,
        secret_key: u32,
    },
    ReadyForQuery(TransactionStatus),
    RowDescription(Vec<FieldDescriptor>),
    /// Column values; `None` is SQL NULL
    DataRow(Vec<Option<Vec<u8>>>),
    /// Command tag, e.g. `SELECT 1`
    CommandComplete(String),
    EmptyQueryResponse,
    ParseComplete,
    BindComplete,
    ParameterDescription(Vec<Oid>),
    NoData,
    NotificationResponse {
        process_id: u32,
        channel: String,
        payload: String,
    },
}

/// Payload-free discriminant of [`Event`], used as the routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMd5Password,
    ErrorResponse,
    NoticeResponse,
    ParameterStatus,
    BackendKeyData,
    ReadyForQuery,
    RowDescription,
    DataRow,
    CommandComplete,
    EmptyQueryResponse,
    ParseComplete,
    BindComplete,
    ParameterDescription,
    NoData,
    NotificationResponse,
}

impl Event {
    /// Routing key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AuthenticationOk => EventKind::AuthenticationOk,
            Event::AuthenticationCleartextPassword => EventKind::AuthenticationCleartextPassword,
            Event::AuthenticationMd5Password { .. } => EventKind::AuthenticationMd5Password,
            Event::ErrorResponse(_) => EventKind::ErrorResponse,
            Event::NoticeResponse(_) => EventKind::NoticeResponse,
            Event::ParameterStatus { .. } => EventKind::ParameterStatus,
            Event::BackendKeyData { .. } => EventKind::BackendKeyData,
            Event::ReadyForQuery(_) => EventKind::ReadyForQuery,
            Event::RowDescription(_) => EventKind::RowDescription,
            Event::DataRow(_) => EventKind::DataRow,
            Event::CommandComplete(_) => EventKind::CommandComplete,
            Event::EmptyQueryResponse => EventKind::EmptyQueryResponse,
            Event::ParseComplete => EventKind::ParseComplete,
            Event::BindComplete => EventKind::BindComplete,
            Event::ParameterDescription(_) => EventKind::ParameterDescription,
            Event::NoData => EventKind::NoData,
            Event::NotificationResponse { .. } => EventKind::NotificationResponse,
        }
    }

    /// Message type byte on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Event::AuthenticationOk
            | Event::AuthenticationCleartextPassword
            | Event::AuthenticationMd5Password { .. } => msg_type::AUTHENTICATION,
            Event::ErrorResponse(_) => msg_type::ERROR_RESPONSE,
            Event::NoticeResponse(_) => msg_type::NOTICE_RESPONSE,
            Event::ParameterStatus { .. } => msg_type::PARAMETER_STATUS,
            Event::BackendKeyData { .. } => msg_type::BACKEND_KEY_DATA,
            Event::ReadyForQuery(_) => msg_type::READY_FOR_QUERY,
            Event::RowDescription(_) => msg_type::ROW_DESCRIPTION,
            Event::DataRow(_) => msg_type::DATA_ROW,
            Event::CommandComplete(_) => msg_type::COMMAND_COMPLETE,
            Event::EmptyQueryResponse => msg_type::EMPTY_QUERY_RESPONSE,
            Event::ParseComplete => msg_type::PARSE_COMPLETE,
            Event::BindComplete => msg_type::BIND_COMPLETE,
            Event::ParameterDescription(_) => msg_type::PARAMETER_DESCRIPTION,
            Event::NoData => msg_type::NO_DATA,
            Event::NotificationResponse { .. } => msg_type::NOTIFICATION_RESPONSE,
        }
    }

    /// Append the framed wire form of this event to `buf`.
    ///
    /// The client never sends these; the encoder serves test servers.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, self.tag());
        match self {
            Event::AuthenticationOk => msg.write_i32(auth::auth_type::OK),
            Event::AuthenticationCleartextPassword => {
                msg.write_i32(auth::auth_type::CLEARTEXT_PASSWORD)
            }
            Event::AuthenticationMd5Password { salt } => {
                msg.write_i32(auth::auth_type::MD5_PASSWORD);
                msg.write_bytes(salt);
            }
            Event::ErrorResponse(fields) | Event::NoticeResponse(fields) => {
                write_fields(msg.buf(), fields)
            }
            Event::ParameterStatus { name, value } => {
                msg.write_cstr(name);
                msg.write_cstr(value);
            }
            Event::BackendKeyData {
                process_id,
                secret_key,
            } => {
                msg.write_u32(*process_id);
                msg.write_u32(*secret_key);
            }
            Event::ReadyForQuery(status) => msg.write_u8(status.as_byte()),
            Event::RowDescription(fields) => write_row_description(msg.buf(), fields),
            Event::DataRow(values) => write_data_row(msg.buf(), values),
            Event::CommandComplete(tag) => msg.write_cstr(tag),
            Event::ParameterDescription(oids) => write_parameter_description(msg.buf(), oids),
            Event::NotificationResponse {
                process_id,
                channel,
                payload,
            } => {
                msg.write_u32(*process_id);
                msg.write_cstr(channel);
                msg.write_cstr(payload);
            }
            Event::EmptyQueryResponse
            | Event::ParseComplete
            | Event::BindComplete
            | Event::NoData => {}
        }
        msg.finish();
    }
}

/// Decode the payload of one backend frame.
///
/// Unknown tags are logged and yield `Ok(None)`.
pub fn parse_response(tag: u8, payload: &[u8]) -> Result<Option<Event>> {
    let event = match tag {
        msg_type::AUTHENTICATION => match AuthenticationMessage::parse(payload)? {
            AuthenticationMessage::Ok => Event::AuthenticationOk,
            AuthenticationMessage::CleartextPassword => Event::AuthenticationCleartextPassword,
            AuthenticationMessage::Md5Password { salt } => {
                Event::AuthenticationMd5Password { salt }
            }
        },
        msg_type::ERROR_RESPONSE => Event::ErrorResponse(parse_fields(payload)?),
        msg_type::NOTICE_RESPONSE => Event::NoticeResponse(parse_fields(payload)?),
        msg_type::PARAMETER_STATUS => {
            let status = ParameterStatus::parse(payload)?;
            Event::ParameterStatus {
                name: status.name.to_string(),
                value: status.value.to_string(),
            }
        }
        msg_type::BACKEND_KEY_DATA => {
            let key = BackendKeyData::parse(payload)?;
            Event::BackendKeyData {
                process_id: key.process_id(),
                secret_key: key.secret(),
            }
        }
        msg_type::READY_FOR_QUERY => {
            Event::ReadyForQuery(ReadyForQuery::parse(payload)?.transaction_status()?)
        }
        msg_type::ROW_DESCRIPTION => Event::RowDescription(parse_row_description(payload)?),
        msg_type::DATA_ROW => Event::DataRow(parse_data_row(payload)?),
        msg_type::COMMAND_COMPLETE => {
            Event::CommandComplete(CommandComplete::parse(payload)?.tag.to_string())
        }
        msg_type::EMPTY_QUERY_RESPONSE => Event::EmptyQueryResponse,
        msg_type::PARSE_COMPLETE => Event::ParseComplete,
        msg_type::BIND_COMPLETE => Event::BindComplete,
        msg_type::PARAMETER_DESCRIPTION => {
            Event::ParameterDescription(parse_parameter_description(payload)?)
        }
        msg_type::NO_DATA => Event::NoData,
        msg_type::NOTIFICATION_RESPONSE => {
            let notification = NotificationResponse::parse(payload)?;
            Event::NotificationResponse {
                process_id: notification.pid,
                channel: notification.channel.to_string(),
                payload: notification.payload.to_string(),
            }
        }
        other => {
            tracing::warn!(
                tag = %(other as char),
                len = payload.len(),
                "dropping unknown backend message"
            );
            return Ok(None);
        }
    };
    Ok(Some(event))
}
