//! Asynchronous PostgreSQL connection.

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::handler::AsyncMessageHandler;
use crate::opts::Opts;
use crate::params::Param;
use crate::protocol::types::TransactionStatus;
use crate::row::QueryResult;
use crate::state::{ConnectionStateMachine, Statement};

use super::driver::{Driver, Request, Snapshot};
use super::stream::Stream;
use super::transaction::Transaction;

/// Asynchronous PostgreSQL connection.
///
/// A background task owns the socket. Methods take `&self`, so several
/// requests can be in flight at once; they run on the wire in the order
/// they were made.
#[derive(Debug)]
pub struct Conn {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<Snapshot>,
}

impl Conn {
    /// Connect to a PostgreSQL server.
    ///
    /// Resolves once authentication is done and the server is ready.
    pub async fn connect<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        if opts.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }

        let addr = format!("{}:{}", opts.host, opts.port);
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true)?;
        Self::connect_with_stream(tcp, opts).await
    }

    /// Connect using an existing TCP stream.
    pub async fn connect_with_stream(tcp: TcpStream, opts: Opts) -> Result<Self> {
        let mut stream = Stream::tcp(tcp);
        let mut machine = ConnectionStateMachine::new(opts);
        machine.start();

        while !machine.is_started() {
            stream.write_all(&machine.take_write_buffer()).await?;
            let chunk = stream.read_chunk().await?;
            if chunk.is_empty() {
                return Err(Error::ConnectionClosed);
            }
            machine.receive(chunk)?;
        }

        // Ignore async messages during startup
        machine.take_async_messages();

        let (requests, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(Snapshot::of(&machine));
        tokio::spawn(Driver::new(stream, machine, rx, snapshot_tx).run());

        Ok(Self { requests, snapshot })
    }

    fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_closed| Error::ConnectionClosed)
    }

    /// Build and submit several legs at once.
    ///
    /// The closure receives a [`Transaction`] builder; whatever it returns,
    /// typically [`Pending`](super::Pending) handles, is handed back.
    pub fn transaction<F, R>(&self, build: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction) -> R,
    {
        let mut tx = Transaction::new();
        let out = build(&mut tx);
        self.request(Request::Submit(tx.into_inner()))?;
        Ok(out)
    }

    /// Execute a simple query.
    pub async fn query(&self, sql: impl Into<String>) -> Result<QueryResult> {
        self.transaction(|tx| tx.query(sql))?.await
    }

    /// Prepare `sql` and execute it once with `params`.
    ///
    /// `?` placeholders are rewritten to `$1..$n`. The statement stays
    /// prepared on the server and later calls with the same SQL skip Parse.
    pub async fn query_with(&self, sql: &str, params: Vec<Param>) -> Result<QueryResult> {
        self.transaction(|tx| tx.query_with(sql, params))?.await
    }

    /// Prepare a statement for [`execute`](Self::execute).
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.transaction(|tx| {
            let statement = tx.prepare(sql);
            tx.sync();
            statement
        })?
        .await
    }

    /// Execute a prepared statement.
    pub async fn execute(&self, statement: &Statement, params: Vec<Param>) -> Result<QueryResult> {
        self.transaction(|tx| tx.execute(statement, params))?.await
    }

    /// Close the connection after the queued work has run.
    ///
    /// Requests made afterwards fail with `ConnectionClosed`.
    pub async fn close(&self) -> Result<()> {
        let (done, closed) = oneshot::channel();
        if self.request(Request::Close(done)).is_err() {
            return Ok(());
        }
        // the driver dropping the sender also means closed
        let _ = closed.await;
        Ok(())
    }

    /// Returns true once the driver task has stopped.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// Get server parameters reported through ParameterStatus.
    pub fn server_params(&self) -> Vec<(String, String)> {
        self.snapshot.borrow().server_params.clone()
    }

    /// Look up one server parameter.
    pub fn server_param(&self, name: &str) -> Option<String> {
        self.snapshot
            .borrow()
            .server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Status byte of the latest ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.snapshot.borrow().transaction_status
    }

    /// Returns true if currently in a transaction block.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status().in_transaction()
    }

    /// Process id and secret key from BackendKeyData.
    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.snapshot.borrow().backend_key
    }

    /// Set the async message handler.
    ///
    /// The handler is called when the server sends asynchronous messages:
    /// - `Notification` - from LISTEN/NOTIFY
    /// - `Notice` - warnings and informational messages
    /// - `ParameterChanged` - server parameter updates
    /// - `Error` - errors that arrive while no statement is running
    pub fn set_async_message_handler<H: AsyncMessageHandler + 'static>(
        &self,
        handler: H,
    ) -> Result<()> {
        self.request(Request::SetHandler(Some(Box::new(handler))))
    }

    /// Remove the async message handler.
    pub fn clear_async_message_handler(&self) -> Result<()> {
        self.request(Request::SetHandler(None))
    }
}
