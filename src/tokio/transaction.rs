//! Transaction builder for the asynchronous connection.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::params::Param;
use crate::row::QueryResult;
use crate::state::{self, Statement, StatementHandle};

/// Result of one queued leg, resolved by the driver.
///
/// Resolves to `Err(Error::ConnectionClosed)` if the connection goes away
/// before the leg runs.
#[derive(Debug)]
#[must_use = "a Pending does nothing unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    fn channel() -> (Self, impl FnOnce(Result<T>) + Send + 'static) {
        let (tx, rx) = oneshot::channel();
        let callback = move |result| {
            if tx.send(result).is_err() {
                tracing::debug!("result dropped, nobody is waiting");
            }
        };
        (Self { rx }, callback)
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ConnectionClosed)))
    }
}

/// Legs submitted together through [`Conn::transaction`](super::Conn::transaction).
///
/// Nothing is sent until the builder closure returns. Legs run in the order
/// they were added.
///
/// ```no_run
/// # async fn demo(conn: &pure_postgres::tokio::Conn) -> pure_postgres::Result<()> {
/// let (inserted, total) = conn.transaction(|tx| {
///     tx.begin();
///     let inserted = tx.query_with("INSERT INTO t (n) VALUES (?)", vec![5.into()]);
///     let total = tx.query("SELECT count(*) FROM t");
///     tx.commit();
///     (inserted, total)
/// })?;
/// inserted.await?;
/// let total = total.await?;
/// println!("{:?}", total.rows[0].get_idx(0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Transaction {
    inner: state::Transaction,
}

impl Transaction {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_inner(self) -> state::Transaction {
        self.inner
    }

    /// Queue a simple query.
    pub fn query(&mut self, sql: impl Into<String>) -> Pending<QueryResult> {
        let (pending, callback) = Pending::channel();
        self.inner.query(sql, callback);
        pending
    }

    /// Queue a prepare of `sql` and one execution with `params`.
    pub fn query_with(&mut self, sql: &str, params: Vec<Param>) -> Pending<QueryResult> {
        let (pending, callback) = Pending::channel();
        self.inner.query_with(sql, params, callback);
        pending
    }

    /// Queue a prepare; resolves to the described statement.
    pub fn prepare(&mut self, sql: &str) -> Pending<Statement> {
        let (pending, callback) = Pending::channel();
        self.inner
            .prepare(sql, move |handle: Result<StatementHandle<'_>>| {
                callback(handle.map(|h| h.statement().clone()))
            });
        pending
    }

    /// Queue one execution of a described statement.
    pub fn execute(&mut self, statement: &Statement, params: Vec<Param>) -> Pending<QueryResult> {
        let (pending, callback) = Pending::channel();
        self.inner.execute(statement, params, callback);
        pending
    }

    pub fn begin(&mut self) -> &mut Self {
        self.inner.begin();
        self
    }

    pub fn commit(&mut self) -> &mut Self {
        self.inner.commit();
        self
    }

    pub fn rollback(&mut self) -> &mut Self {
        self.inner.rollback();
        self
    }

    /// Queue a lone `Sync`, closing a run of prepares.
    pub fn sync(&mut self) -> &mut Self {
        self.inner.sync();
        self
    }
}
