//! Ordered queue of legs submitted together.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::params::Param;
use crate::row::QueryResult;

use super::leg::{BoundExecution, Leg, Prepare, SimpleQuery, Statement, StatementHandle, SyncMarker};

/// A queue of legs that run back to back on one connection.
///
/// Every call on the connection becomes a transaction: a bare query is a
/// transaction of one leg. Legs run strictly in order, and the connection
/// releases the transaction once every leg has been acknowledged.
#[derive(Default)]
pub struct Transaction {
    legs: VecDeque<Box<dyn Leg>>,
    pending: usize,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("legs", &self.legs.iter().map(|l| l.name()).collect::<Vec<_>>())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any leg.
    pub fn push(&mut self, leg: Box<dyn Leg>) -> &mut Self {
        self.legs.push_back(leg);
        self.pending += 1;
        self
    }

    /// Run `sql` through the simple query protocol.
    pub fn query(
        &mut self,
        sql: impl Into<String>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> &mut Self {
        self.push(Box::new(SimpleQuery::new(sql, callback)))
    }

    /// Prepare `sql` and execute it once with `params`.
    pub fn query_with(
        &mut self,
        sql: &str,
        params: Vec<Param>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> &mut Self {
        self.prepare(sql, move |handle: Result<StatementHandle<'_>>| match handle {
            Ok(mut handle) => handle.execute(params, callback),
            Err(e) => callback(Err(e)),
        })
    }

    /// Prepare `sql`; `callback` runs once the statement is executable.
    pub fn prepare(
        &mut self,
        sql: &str,
        callback: impl for<'h> FnOnce(Result<StatementHandle<'h>>) + Send + 'static,
    ) -> &mut Self {
        self.push(Box::new(Prepare::new(sql, callback)))
    }

    /// Execute an already described statement.
    ///
    /// Passing more arguments than the statement has parameters fails the
    /// callback immediately without queueing anything.
    pub fn execute(
        &mut self,
        statement: &Statement,
        params: Vec<Param>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> &mut Self {
        if let Some(leg) = BoundExecution::new(statement.clone(), params, Box::new(callback)) {
            self.push(Box::new(leg));
        }
        self
    }

    /// Queue `BEGIN`.
    pub fn begin(&mut self) -> &mut Self {
        self.query("BEGIN", log_failure("BEGIN"))
    }

    /// Queue `COMMIT`.
    pub fn commit(&mut self) -> &mut Self {
        self.query("COMMIT", log_failure("COMMIT"))
    }

    /// Queue `ROLLBACK`.
    pub fn rollback(&mut self) -> &mut Self {
        self.query("ROLLBACK", log_failure("ROLLBACK"))
    }

    /// Queue a lone `Sync`.
    pub fn sync(&mut self) -> &mut Self {
        self.push(Box::new(SyncMarker::new()))
    }

    /// Legs not yet acknowledged, including the one running.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns true once every leg has been acknowledged.
    pub fn can_release(&self) -> bool {
        self.pending == 0
    }

    /// Returns true if no leg is waiting to start.
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Take the next leg to run. It stays pending until acknowledged.
    pub(crate) fn next_leg(&mut self) -> Option<Box<dyn Leg>> {
        self.legs.pop_front()
    }

    /// Put legs yielded by the running leg ahead of everything queued.
    pub(crate) fn push_front(&mut self, legs: Vec<Box<dyn Leg>>) {
        self.pending += legs.len();
        for leg in legs.into_iter().rev() {
            self.legs.push_front(leg);
        }
    }

    /// Mark the running leg as done.
    pub(crate) fn acknowledge(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Fail every leg that has not started.
    pub(crate) fn fail(&mut self, error: &Error) {
        for mut leg in self.legs.drain(..) {
            leg.fail(error.duplicate());
        }
        self.pending = 0;
    }
}

fn log_failure(command: &'static str) -> impl FnOnce(Result<QueryResult>) + Send + 'static {
    move |result| {
        if let Err(error) = result {
            tracing::warn!(command, %error, "transaction control failed");
        }
    }
}
