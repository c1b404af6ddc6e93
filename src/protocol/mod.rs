//! PostgreSQL wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `backend`: Server → Client messages (parsing into [`Event`])
//! - `frontend`: Client → Server messages (encoding)
//! - `codec`: Low-level encoding/decoding primitives and [`Frame`]
//! - `types`: Common protocol types (FormatCode, Oid, TransactionStatus)

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::{Event, EventKind, FieldDescriptor, parse_response};
pub use codec::Frame;
pub use frontend::FrontendMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
