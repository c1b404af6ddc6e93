//! A pipelined PostgreSQL client built on a sans-I/O protocol core.
//!
//! # Features
//!
//! - **Sans-I/O state machines**: framing, authentication and scheduling live in
//!   [`state::ConnectionStateMachine`], which only consumes and produces bytes
//! - **Pipelining**: work is queued as transactions of legs and put on the wire
//!   strictly in order
//! - **Prepared statements**: `?` placeholders, cached statement descriptions,
//!   parameters bound per execution
//! - **Typed values**: text results coerced by type OID, dates and times under
//!   the server's `DateStyle`
//!
//! # Example
//!
//! ```no_run
//! use pure_postgres::tokio::Conn;
//! use pure_postgres::{Opts, Value};
//!
//! #[tokio::main]
//! async fn main() -> pure_postgres::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("mydb".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let conn = Conn::connect(opts).await?;
//!
//!     let result = conn.query("SELECT 1::int AS num").await?;
//!     assert_eq!(result.rows[0].get("num"), Some(&Value::Int(1)));
//!
//!     let result = conn.query_with("SELECT ?::int + 1 AS next", vec![41.into()]).await?;
//!     println!("Rows: {:?}", result.rows);
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

pub mod datestyle;
pub mod error;
pub mod handler;
pub mod opts;
pub mod params;
pub mod protocol;
pub mod row;
pub mod state;
pub mod value;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use datestyle::DateStyle;
pub use error::{Error, ErrorFields, Result};
pub use handler::{AsyncMessage, AsyncMessageHandler};
pub use opts::Opts;
pub use params::Param;
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use row::{QueryResult, Row};
pub use state::{ConnectionState, ConnectionStateMachine, Statement, Transaction};
pub use value::Value;
