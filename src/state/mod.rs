//! Sans-I/O state machines for PostgreSQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! Bytes go in through [`ConnectionStateMachine::receive`] and come out of
//! [`ConnectionStateMachine::take_write_buffer`].

pub mod connection;
pub mod leg;
pub mod reassembler;
pub mod transaction;

pub use connection::{ConnectionState, ConnectionStateMachine};
pub use leg::{
    BoundExecution, Leg, Prepare, PrepareCallback, QueryCallback, Session, SimpleQuery,
    Statement, StatementHandle, SyncMarker, rewrite_placeholders,
};
pub use reassembler::Reassembler;
pub use transaction::Transaction;
