//! Statement legs: the units of work a transaction puts on the wire.
//!
//! Each leg owns an ordered list of frontend messages and declares which
//! backend events it consumes. The connection sends a leg's messages, routes
//! matching events to it, and starts the next leg once this one is
//! acknowledged (on ReadyForQuery for legs ending in Sync or Query, on
//! completion for the others).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::datestyle::DateStyle;
use crate::error::{Error, Result};
use crate::params::Param;
use crate::protocol::backend::{Event, EventKind, FieldDescriptor};
use crate::protocol::frontend::{DescribeTarget, FrontendMessage, md5_hex};
use crate::protocol::types::Oid;
use crate::row::{QueryResult, RowDecoder};

/// Receives the outcome of a query or an execution.
pub type QueryCallback = Box<dyn FnOnce(Result<QueryResult>) + Send>;

/// Receives a prepared statement once it is executable.
pub type PrepareCallback = Box<dyn for<'h> FnOnce(Result<StatementHandle<'h>>) + Send>;

/// Connection-scoped state the legs read and update.
#[derive(Debug, Default)]
pub struct Session {
    /// Current `DateStyle` server parameter
    pub date_style: DateStyle,
    statements: HashMap<String, Statement>,
    executions: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Described statement with this name, if any.
    pub fn statement(&self, name: &str) -> Option<&Statement> {
        self.statements.get(name)
    }

    fn remember(&mut self, statement: &Statement) {
        self.statements
            .insert(statement.name.clone(), statement.clone());
    }

    /// Portal name for one execution of `statement` with `params`.
    fn portal_name(&mut self, statement: &str, params: &[Param]) -> String {
        let mut encoded = Vec::new();
        for param in params {
            param.encode(&mut encoded);
        }
        self.executions += 1;
        md5_hex(&[
            statement.as_bytes(),
            &encoded,
            &self.executions.to_be_bytes(),
        ])
    }
}

/// A server-side prepared statement and its description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    name: String,
    sql: String,
    param_types: Vec<Oid>,
    columns: Option<Arc<[FieldDescriptor]>>,
}

impl Statement {
    /// Statement for `sql`, named by the hash of its rewritten text.
    pub fn new(sql: &str) -> Self {
        let sql = rewrite_placeholders(sql);
        Self {
            name: md5_hex(&[sql.as_bytes()]),
            sql,
            param_types: Vec::new(),
            columns: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL text with `$n` placeholders, as sent in Parse.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter types from ParameterDescription.
    pub fn param_types(&self) -> &[Oid] {
        &self.param_types
    }

    /// Result columns, or `None` if the statement returns no rows.
    pub fn columns(&self) -> Option<&[FieldDescriptor]> {
        self.columns.as_deref()
    }
}

/// Handle passed to a prepare callback.
///
/// Executions requested through the handle run before any leg queued after
/// the prepare, in the order they were requested.
pub struct StatementHandle<'h> {
    statement: &'h Statement,
    yielded: &'h mut Vec<Box<dyn Leg>>,
}

impl StatementHandle<'_> {
    pub fn statement(&self) -> &Statement {
        self.statement
    }

    /// Queue an execution of the statement with `params`.
    pub fn execute(
        &mut self,
        params: Vec<Param>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) {
        if let Some(leg) = BoundExecution::new(self.statement.clone(), params, Box::new(callback))
        {
            self.yielded.push(Box::new(leg));
        }
    }
}

/// Behavior shared by every leg.
pub trait Leg: Send {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Called once when the leg becomes current, before any action is taken.
    fn start(&mut self, _session: &mut Session) {}

    /// Next frontend message to send, front to back.
    fn next_action(&mut self) -> Option<FrontendMessage>;

    /// Returns true once every action has been taken.
    fn is_empty(&self) -> bool;

    /// Backend events this leg consumes.
    fn listens(&self) -> &'static [EventKind];

    /// Consume one routed event. An error means the stream is desynchronized.
    fn handle_event(&mut self, event: Event, session: &mut Session) -> Result<()>;

    /// Deliver `error` to the caller; later events are ignored.
    fn fail(&mut self, error: Error);

    /// Returns true once the terminal response has been observed.
    fn is_complete(&self) -> bool;

    /// Returns true once the caller has received an outcome.
    fn is_settled(&self) -> bool {
        self.is_complete()
    }

    /// Called on the ReadyForQuery that acknowledges a complete leg.
    fn settle(&mut self) {}

    /// Returns true if the leg's messages make the server send ReadyForQuery.
    fn ends_with_sync(&self) -> bool;

    /// Legs created while handling events, to run right after this one.
    fn take_yielded(&mut self) -> Vec<Box<dyn Leg>> {
        Vec::new()
    }
}

/// Rewrite `?` placeholders to `$1..$n`, leaving quoted text untouched.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;

    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
                continue;
            }
            None => {}
        }
        out.push(c);
    }

    out
}

/// Result of a sync-ending leg, held until its ReadyForQuery.
///
/// An ERROR can still follow CommandComplete (a later statement of the same
/// query, a deferred constraint checked on Sync) and roll the work back.
struct HeldReply {
    callback: Option<QueryCallback>,
    result: Option<QueryResult>,
}

impl HeldReply {
    fn new(callback: QueryCallback) -> Self {
        Self {
            callback: Some(callback),
            result: None,
        }
    }

    /// Still waiting for the first result.
    fn is_open(&self) -> bool {
        self.callback.is_some() && self.result.is_none()
    }

    fn hold(&mut self, result: QueryResult) {
        if self.is_open() {
            self.result = Some(result);
        }
    }

    fn fail(&mut self, error: Error) {
        self.result = None;
        if let Some(callback) = self.callback.take() {
            callback(Err(error));
        }
    }

    fn settle(&mut self) {
        let Some(result) = self.result.take() else {
            return;
        };
        if let Some(callback) = self.callback.take() {
            callback(Ok(result));
        }
    }

    fn is_complete(&self) -> bool {
        !self.is_open()
    }

    fn is_settled(&self) -> bool {
        self.callback.is_none()
    }
}

/// A single `Query` message.
pub struct SimpleQuery {
    sql: Option<String>,
    decoder: RowDecoder,
    reply: HeldReply,
}

impl SimpleQuery {
    pub fn new(
        sql: impl Into<String>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> Self {
        Self {
            sql: Some(sql.into()),
            decoder: RowDecoder::new(),
            reply: HeldReply::new(Box::new(callback)),
        }
    }
}

impl Leg for SimpleQuery {
    fn name(&self) -> &'static str {
        "SimpleQuery"
    }

    fn next_action(&mut self) -> Option<FrontendMessage> {
        self.sql.take().map(FrontendMessage::Query)
    }

    fn is_empty(&self) -> bool {
        self.sql.is_none()
    }

    fn listens(&self) -> &'static [EventKind] {
        &[
            EventKind::RowDescription,
            EventKind::DataRow,
            EventKind::CommandComplete,
            EventKind::EmptyQueryResponse,
        ]
    }

    fn handle_event(&mut self, event: Event, session: &mut Session) -> Result<()> {
        if !self.reply.is_open() {
            tracing::debug!(event = ?event.kind(), "discarding extra result set");
            return Ok(());
        }
        match event {
            Event::RowDescription(fields) => self.decoder.describe(fields),
            Event::DataRow(values) => match self.decoder.push(values, session.date_style) {
                Err(e @ Error::ProtocolViolation(_)) => return Err(e),
                Err(e) => self.fail(e),
                Ok(()) => {}
            },
            Event::CommandComplete(tag) => {
                let result = self.decoder.finish(tag);
                self.reply.hold(result);
            }
            Event::EmptyQueryResponse => self.reply.hold(QueryResult::default()),
            other => tracing::warn!(event = ?other.kind(), "unexpected event for simple query"),
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) {
        self.reply.fail(error);
    }

    fn is_complete(&self) -> bool {
        self.reply.is_complete()
    }

    fn is_settled(&self) -> bool {
        self.reply.is_settled()
    }

    fn settle(&mut self) {
        self.reply.settle();
    }

    fn ends_with_sync(&self) -> bool {
        true
    }
}

/// `Parse, Describe, Flush` for a statement, gated on its full description.
pub struct Prepare {
    statement: Statement,
    actions: VecDeque<FrontendMessage>,
    parse_complete: bool,
    params_described: bool,
    rows_described: bool,
    callback: Option<PrepareCallback>,
    yielded: Vec<Box<dyn Leg>>,
}

impl Prepare {
    pub fn new(
        sql: &str,
        callback: impl for<'h> FnOnce(Result<StatementHandle<'h>>) + Send + 'static,
    ) -> Self {
        let statement = Statement::new(sql);
        let actions = VecDeque::from([
            FrontendMessage::Parse {
                name: statement.name.clone(),
                query: statement.sql.clone(),
                param_types: Vec::new(),
            },
            FrontendMessage::Describe {
                target: DescribeTarget::Statement,
                name: statement.name.clone(),
            },
            FrontendMessage::Flush,
        ]);
        Self {
            statement,
            actions,
            parse_complete: false,
            params_described: false,
            rows_described: false,
            callback: Some(Box::new(callback)),
            yielded: Vec::new(),
        }
    }

    fn is_executable(&self) -> bool {
        self.parse_complete && self.params_described && self.rows_described
    }

    fn fire(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Ok(StatementHandle {
                statement: &self.statement,
                yielded: &mut self.yielded,
            }));
        }
    }
}

impl Leg for Prepare {
    fn name(&self) -> &'static str {
        "Prepare"
    }

    fn start(&mut self, session: &mut Session) {
        if let Some(cached) = session.statement(&self.statement.name) {
            tracing::debug!(statement = %cached.name, "statement already prepared");
            self.statement = cached.clone();
            self.actions.clear();
            self.fire();
        }
    }

    fn next_action(&mut self) -> Option<FrontendMessage> {
        self.actions.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn listens(&self) -> &'static [EventKind] {
        &[
            EventKind::ParseComplete,
            EventKind::ParameterDescription,
            EventKind::RowDescription,
            EventKind::NoData,
        ]
    }

    fn handle_event(&mut self, event: Event, session: &mut Session) -> Result<()> {
        if self.callback.is_none() {
            tracing::debug!(event = ?event.kind(), "ignoring event for settled prepare");
            return Ok(());
        }
        match event {
            Event::ParseComplete => self.parse_complete = true,
            Event::ParameterDescription(oids) => {
                self.statement.param_types = oids;
                self.params_described = true;
            }
            Event::RowDescription(fields) => {
                self.statement.columns = Some(fields.into());
                self.rows_described = true;
            }
            Event::NoData => {
                self.statement.columns = None;
                self.rows_described = true;
            }
            other => tracing::warn!(event = ?other.kind(), "unexpected event for prepare"),
        }
        if self.is_executable() {
            session.remember(&self.statement);
            self.fire();
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) {
        if let Some(callback) = self.callback.take() {
            callback(Err(error));
        }
    }

    fn is_complete(&self) -> bool {
        self.callback.is_none()
    }

    fn ends_with_sync(&self) -> bool {
        false
    }

    fn take_yielded(&mut self) -> Vec<Box<dyn Leg>> {
        std::mem::take(&mut self.yielded)
    }
}

/// `Bind, Execute, Flush, Sync` for one execution of a prepared statement.
pub struct BoundExecution {
    actions: VecDeque<FrontendMessage>,
    statement: Statement,
    params: Vec<Param>,
    decoder: RowDecoder,
    reply: HeldReply,
}

impl BoundExecution {
    /// Build an execution, or reject it through `callback` when more
    /// arguments than parameters are given or an argument does not fit its
    /// parameter type. Missing arguments are NULL.
    pub fn new(statement: Statement, mut params: Vec<Param>, callback: QueryCallback) -> Option<Self> {
        let expected = statement.param_types.len();
        if params.len() > expected {
            callback(Err(Error::InvalidUsage(format!(
                "statement takes {expected} parameters but {} were given",
                params.len()
            ))));
            return None;
        }
        params.resize(expected, Param::Null);

        let params = match params
            .into_iter()
            .zip(&statement.param_types)
            .map(|(param, &target)| param.coerce(target))
            .collect::<Result<Vec<_>>>()
        {
            Ok(params) => params,
            Err(e) => {
                callback(Err(e));
                return None;
            }
        };

        Some(Self {
            actions: VecDeque::new(),
            decoder: RowDecoder::with_columns(statement.columns.clone()),
            statement,
            params,
            reply: HeldReply::new(callback),
        })
    }
}

impl Leg for BoundExecution {
    fn name(&self) -> &'static str {
        "BoundExecution"
    }

    fn start(&mut self, session: &mut Session) {
        let portal = session.portal_name(&self.statement.name, &self.params);
        self.actions = VecDeque::from([
            FrontendMessage::Bind {
                portal: portal.clone(),
                statement: self.statement.name.clone(),
                params: std::mem::take(&mut self.params),
            },
            FrontendMessage::Execute {
                portal,
                max_rows: 0,
            },
            FrontendMessage::Flush,
            FrontendMessage::Sync,
        ]);
    }

    fn next_action(&mut self) -> Option<FrontendMessage> {
        self.actions.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn listens(&self) -> &'static [EventKind] {
        &[
            EventKind::BindComplete,
            EventKind::DataRow,
            EventKind::CommandComplete,
            EventKind::EmptyQueryResponse,
        ]
    }

    fn handle_event(&mut self, event: Event, session: &mut Session) -> Result<()> {
        if !self.reply.is_open() {
            tracing::debug!(event = ?event.kind(), "ignoring event for finished execution");
            return Ok(());
        }
        match event {
            Event::BindComplete => {}
            Event::DataRow(values) => match self.decoder.push(values, session.date_style) {
                Err(e @ Error::ProtocolViolation(_)) => return Err(e),
                Err(e) => self.fail(e),
                Ok(()) => {}
            },
            Event::CommandComplete(tag) => {
                let result = self.decoder.finish(tag);
                self.reply.hold(result);
            }
            Event::EmptyQueryResponse => self.reply.hold(QueryResult::default()),
            other => tracing::warn!(event = ?other.kind(), "unexpected event for execution"),
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) {
        self.reply.fail(error);
    }

    fn is_complete(&self) -> bool {
        self.reply.is_complete()
    }

    fn is_settled(&self) -> bool {
        self.reply.is_settled()
    }

    fn settle(&mut self) {
        self.reply.settle();
    }

    fn ends_with_sync(&self) -> bool {
        true
    }
}

/// A lone `Sync`, closing an extended-protocol sequence.
#[derive(Debug, Default)]
pub struct SyncMarker {
    sent: bool,
}

impl SyncMarker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Leg for SyncMarker {
    fn name(&self) -> &'static str {
        "SyncMarker"
    }

    fn next_action(&mut self) -> Option<FrontendMessage> {
        if self.sent {
            return None;
        }
        self.sent = true;
        Some(FrontendMessage::Sync)
    }

    fn is_empty(&self) -> bool {
        self.sent
    }

    fn listens(&self) -> &'static [EventKind] {
        &[]
    }

    fn handle_event(&mut self, event: Event, _session: &mut Session) -> Result<()> {
        Err(Error::ProtocolViolation(format!(
            "unexpected {:?} for Sync",
            event.kind()
        )))
    }

    fn fail(&mut self, error: Error) {
        tracing::warn!(%error, "error while syncing");
    }

    fn is_complete(&self) -> bool {
        self.sent
    }

    fn ends_with_sync(&self) -> bool {
        true
    }
}
