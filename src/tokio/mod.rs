//! Asynchronous PostgreSQL client using Tokio.
//!
//! [`Conn::connect`] authenticates, then hands the socket to a driver task.
//! Requests reach the driver over a channel and results come back as
//! [`Pending`] futures.

mod conn;
mod driver;
mod stream;
mod transaction;

pub use conn::Conn;
pub use transaction::{Pending, Transaction};
