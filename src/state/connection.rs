//! Connection state machine: startup, authentication, event routing and
//! leg scheduling.
//!
//! The machine performs no I/O. Feed it socket bytes with [`receive`], send
//! whatever [`take_write_buffer`] returns, and close the socket once
//! [`wants_close`] is set.
//!
//! [`receive`]: ConnectionStateMachine::receive
//! [`take_write_buffer`]: ConnectionStateMachine::take_write_buffer
//! [`wants_close`]: ConnectionStateMachine::wants_close

use std::collections::VecDeque;

use crate::datestyle::DateStyle;
use crate::error::{Error, Result};
use crate::handler::AsyncMessage;
use crate::opts::Opts;
use crate::params::Param;
use crate::protocol::backend::{Event, parse_response};
use crate::protocol::frontend::{FrontendMessage, md5_password};
use crate::protocol::types::TransactionStatus;
use crate::row::QueryResult;

use super::leg::{Leg, Session, Statement, StatementHandle};
use super::reassembler::Reassembler;
use super::transaction::Transaction;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, startup message not yet written
    Connecting,
    /// Startup sent, waiting for the first ReadyForQuery
    Authenticating,
    /// Idle and accepting work
    Ready,
    /// A leg is running
    Busy,
    /// Close requested or fatal error seen; no new work is accepted
    Draining,
    Closed,
}

/// The leg currently on the wire.
struct Running {
    leg: Box<dyn Leg>,
    /// A Sync has been sent for this leg, so it ends with ReadyForQuery
    synced: bool,
}

/// Sans-I/O PostgreSQL connection.
pub struct ConnectionStateMachine {
    opts: Opts,
    state: ConnectionState,
    session: Session,
    reassembler: Reassembler,
    /// The wire may accept the next leg
    ready: bool,
    closing: bool,
    wants_close: bool,
    tx_queue: VecDeque<Transaction>,
    current_tx: Option<Transaction>,
    current: Option<Running>,
    write_buffer: Vec<u8>,
    async_messages: Vec<AsyncMessage>,
    server_params: Vec<(String, String)>,
    backend_key: Option<(u32, u32)>,
    transaction_status: TransactionStatus,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.state())
            .field("queued", &self.tx_queue.len())
            .field("current_leg", &self.current.as_ref().map(|r| r.leg.name()))
            .field("transaction_status", &self.transaction_status)
            .finish()
    }
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(opts: Opts) -> Self {
        Self {
            opts,
            state: ConnectionState::Connecting,
            session: Session::new(),
            reassembler: Reassembler::new(),
            ready: false,
            closing: false,
            wants_close: false,
            tx_queue: VecDeque::new(),
            current_tx: None,
            current: None,
            write_buffer: Vec::new(),
            async_messages: Vec::new(),
            server_params: Vec::new(),
            backend_key: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        match self.state {
            ConnectionState::Ready if !self.ready => ConnectionState::Busy,
            state => state,
        }
    }

    /// Returns true once the first ReadyForQuery has been seen.
    pub fn is_started(&self) -> bool {
        !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Authenticating
        )
    }

    /// Get server parameters reported through ParameterStatus.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    /// Look up one server parameter.
    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Process id and secret key from BackendKeyData.
    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.backend_key
    }

    /// Status byte of the latest ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn date_style(&self) -> DateStyle {
        self.session.date_style
    }

    /// Described statement with this name, if any.
    pub fn statement(&self, name: &str) -> Option<&Statement> {
        self.session.statement(name)
    }

    /// Returns true when the socket should be closed.
    pub fn wants_close(&self) -> bool {
        self.wants_close
    }

    /// Take the bytes to write to the socket.
    pub fn take_write_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.write_buffer)
    }

    /// Take the asynchronous messages received so far.
    pub fn take_async_messages(&mut self) -> Vec<AsyncMessage> {
        std::mem::take(&mut self.async_messages)
    }

    /// Write the StartupMessage.
    pub fn start(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let params = self
            .opts
            .startup_params()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        self.send(FrontendMessage::Startup(params));
        self.state = ConnectionState::Authenticating;
    }

    /// Queue a transaction.
    ///
    /// After [`close`](Self::close) or a fatal error the transaction is
    /// rejected with `ConnectionClosed` and none of its callbacks run.
    pub fn submit(&mut self, tx: Transaction) -> Result<()> {
        if self.closing || matches!(self.state, ConnectionState::Draining | ConnectionState::Closed)
        {
            return Err(Error::ConnectionClosed);
        }
        tracing::debug!(legs = tx.pending(), "transaction queued");
        self.tx_queue.push_back(tx);
        self.pump();
        Ok(())
    }

    /// Queue a simple query.
    pub fn query(
        &mut self,
        sql: impl Into<String>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> Result<()> {
        let mut tx = Transaction::new();
        tx.query(sql, callback);
        self.submit(tx)
    }

    /// Queue a prepare followed by one execution with `params`.
    pub fn query_with(
        &mut self,
        sql: &str,
        params: Vec<Param>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> Result<()> {
        let mut tx = Transaction::new();
        tx.query_with(sql, params, callback);
        self.submit(tx)
    }

    /// Queue a prepare; `callback` may execute the statement through its handle.
    pub fn prepare(
        &mut self,
        sql: &str,
        callback: impl for<'h> FnOnce(Result<StatementHandle<'h>>) + Send + 'static,
    ) -> Result<()> {
        let mut tx = Transaction::new();
        tx.prepare(sql, callback);
        self.submit(tx)
    }

    /// Queue one execution of a described statement.
    pub fn execute(
        &mut self,
        statement: &Statement,
        params: Vec<Param>,
        callback: impl FnOnce(Result<QueryResult>) + Send + 'static,
    ) -> Result<()> {
        let mut tx = Transaction::new();
        tx.execute(statement, params, callback);
        self.submit(tx)
    }

    /// Request a graceful close.
    ///
    /// Queued work still runs; Terminate is written once everything has been
    /// acknowledged.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.closing = true;
        if self.is_started() {
            self.state = ConnectionState::Draining;
        }
        self.pump();
    }

    /// The socket is gone: fail everything still pending.
    pub fn connection_lost(&mut self) {
        if self.has_work() {
            tracing::warn!("connection lost with work pending");
        }
        self.fail_all(&Error::ConnectionClosed);
        self.state = ConnectionState::Closed;
        self.wants_close = true;
    }

    /// Feed bytes read from the socket.
    ///
    /// An error is fatal: every pending callback has been failed with it and
    /// the socket should be closed.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        self.reassembler.push(chunk);

        while let Some(frame) = self.reassembler.next_frame().map_err(|e| self.abort(e))? {
            let Some(tag) = frame.tag else {
                return Err(self.abort(Error::MalformedFrame("untagged backend frame".into())));
            };
            if self.opts.trace_protocol {
                tracing::debug!(tag = %char::from(tag), length = frame.length(), "<-");
            }

            let Some(event) = parse_response(tag, &frame.payload).map_err(|e| self.abort(e))?
            else {
                continue;
            };
            self.dispatch(event).map_err(|e| self.abort(e))?;
            self.pump();

            if self.state == ConnectionState::Closed {
                break;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        let kind = event.kind();
        if let Some(running) = self
            .current
            .as_mut()
            .filter(|running| running.leg.listens().contains(&kind))
        {
            running.leg.handle_event(event, &mut self.session)?;
            if running.leg.is_complete() && !running.synced {
                self.acknowledge();
            }
            return Ok(());
        }

        match event {
            Event::AuthenticationOk => {
                tracing::debug!("authenticated");
            }
            Event::AuthenticationCleartextPassword => {
                let password = self.password()?;
                self.send(FrontendMessage::Password(password));
            }
            Event::AuthenticationMd5Password { salt } => {
                let password = self.password()?;
                let digest = md5_password(&self.opts.user, &password, &salt);
                self.send(FrontendMessage::Password(digest));
            }
            Event::ParameterStatus { name, value } => self.set_server_param(name, value),
            Event::BackendKeyData {
                process_id,
                secret_key,
            } => {
                self.backend_key = Some((process_id, secret_key));
            }
            Event::NoticeResponse(fields) => {
                tracing::info!(notice = %fields, "server notice");
                self.async_messages.push(AsyncMessage::Notice(fields));
            }
            Event::NotificationResponse {
                process_id,
                channel,
                payload,
            } => {
                self.async_messages.push(AsyncMessage::Notification {
                    pid: process_id,
                    channel,
                    payload,
                });
            }
            Event::ErrorResponse(fields) => {
                if !self.is_started() {
                    return Err(Error::FatalServer(fields));
                }
                let error = Error::from_server(fields);
                if error.is_fatal() {
                    return Err(error);
                }
                self.route_error(error);
            }
            Event::ReadyForQuery(status) => self.ready_for_query(status),
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unexpected {:?} with no statement listening",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn password(&self) -> Result<String> {
        self.opts
            .password
            .clone()
            .ok_or_else(|| Error::Auth("Password required but not provided".into()))
    }

    fn set_server_param(&mut self, name: String, value: String) {
        if name == "DateStyle" {
            self.session.date_style = DateStyle::parse(&value);
        }
        match self.server_params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.clone(),
            None => self.server_params.push((name.clone(), value.clone())),
        }
        if self.is_started() {
            self.async_messages
                .push(AsyncMessage::ParameterChanged { name, value });
        }
    }

    /// Deliver an ERROR-severity response to the running leg.
    fn route_error(&mut self, error: Error) {
        let Some(running) = self.current.as_mut() else {
            tracing::warn!(%error, "server error with no statement running");
            self.async_messages.push(AsyncMessage::Error(error));
            return;
        };

        if running.leg.is_settled() {
            tracing::warn!(leg = running.leg.name(), %error, "server error after statement finished");
            self.async_messages.push(AsyncMessage::Error(error));
        } else {
            tracing::debug!(leg = running.leg.name(), %error, "statement failed");
            running.leg.fail(error);
        }
        if !running.synced {
            // the server discards messages until Sync
            running.synced = true;
            self.send(FrontendMessage::Sync);
        }
    }

    fn ready_for_query(&mut self, status: TransactionStatus) {
        self.transaction_status = status;

        if !self.is_started() {
            tracing::info!(params = self.server_params.len(), "connection ready");
            self.state = if self.closing {
                ConnectionState::Draining
            } else {
                ConnectionState::Ready
            };
            self.ready = true;
            return;
        }

        match self.current.as_mut() {
            Some(running) => {
                if running.leg.is_complete() {
                    running.leg.settle();
                } else {
                    let name = running.leg.name();
                    running.leg.fail(Error::ProtocolViolation(format!(
                        "ReadyForQuery before {name} completed"
                    )));
                }
                self.acknowledge();
            }
            None => {
                tracing::debug!("ReadyForQuery with no statement running");
                self.ready = true;
            }
        }
    }

    /// Retire the running leg and queue whatever it yielded.
    fn acknowledge(&mut self) {
        if let Some(mut running) = self.current.take() {
            let yielded = running.leg.take_yielded();
            tracing::debug!(leg = running.leg.name(), yielded = yielded.len(), "leg acknowledged");
            if let Some(tx) = self.current_tx.as_mut() {
                tx.push_front(yielded);
                tx.acknowledge();
            }
        }
        self.ready = true;
    }

    /// Start legs while the wire is free, and terminate once drained.
    fn pump(&mut self) {
        while self.ready && self.current.is_none() {
            let Some(mut leg) = self.next_leg() else {
                break;
            };
            tracing::debug!(leg = leg.name(), "starting leg");
            leg.start(&mut self.session);
            while let Some(message) = leg.next_action() {
                self.send(message);
            }

            self.ready = false;
            let synced = leg.ends_with_sync();
            let done = leg.is_complete() && !synced;
            self.current = Some(Running { leg, synced });
            if done {
                self.acknowledge();
            }
        }

        if self.closing && self.state != ConnectionState::Closed && !self.has_work() && self.ready {
            tracing::debug!("queue drained, terminating");
            self.send(FrontendMessage::Terminate);
            self.state = ConnectionState::Closed;
            self.wants_close = true;
        }
    }

    fn next_leg(&mut self) -> Option<Box<dyn Leg>> {
        loop {
            if let Some(tx) = self.current_tx.as_mut() {
                if let Some(leg) = tx.next_leg() {
                    return Some(leg);
                }
                if !tx.can_release() {
                    return None;
                }
                self.current_tx = None;
            }
            self.current_tx = Some(self.tx_queue.pop_front()?);
        }
    }

    fn has_work(&self) -> bool {
        self.current.is_some()
            || !self.tx_queue.is_empty()
            || self
                .current_tx
                .as_ref()
                .is_some_and(|tx| !tx.can_release())
    }

    fn send(&mut self, message: FrontendMessage) {
        let start = self.write_buffer.len();
        message.write(&mut self.write_buffer);
        if self.opts.trace_protocol {
            tracing::debug!(
                message = message.name(),
                length = self.write_buffer.len() - start,
                "->"
            );
        }
    }

    fn fail_all(&mut self, error: &Error) {
        if let Some(mut running) = self.current.take() {
            running.leg.fail(error.duplicate());
        }
        if let Some(mut tx) = self.current_tx.take() {
            tx.fail(error);
        }
        for mut tx in self.tx_queue.drain(..) {
            tx.fail(error);
        }
        self.ready = false;
    }

    /// Fail everything and stop accepting work after a fatal error.
    fn abort(&mut self, error: Error) -> Error {
        tracing::warn!(%error, "fatal connection error");
        self.fail_all(&error);
        self.state = ConnectionState::Draining;
        self.wants_close = true;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorFields;
    use crate::protocol::backend::FieldDescriptor;
    use crate::protocol::codec::Frame;
    use crate::protocol::types::oid;
    use std::sync::{Arc, Mutex};

    fn frames(events: &[Event]) -> Vec<u8> {
        let mut buf = Vec::new();
        for event in events {
            event.write(&mut buf);
        }
        buf
    }

    fn sent(machine: &mut ConnectionStateMachine) -> Vec<FrontendMessage> {
        let buf = machine.take_write_buffer();
        let mut data = buf.as_slice();
        let mut messages = Vec::new();
        while !data.is_empty() {
            // a tag byte is never zero; startup frames begin with their length
            let (frame, used) = if data[0] == 0 {
                Frame::decode_untagged(data).unwrap().unwrap()
            } else {
                Frame::decode(data).unwrap().unwrap()
            };
            messages.push(FrontendMessage::parse(&frame).unwrap());
            data = &data[used..];
        }
        messages
    }

    fn ready_machine() -> ConnectionStateMachine {
        let mut machine = ConnectionStateMachine::new(Opts {
            user: "alice".into(),
            ..Opts::default()
        });
        machine.start();
        machine.take_write_buffer();
        machine
            .receive(&frames(&[
                Event::AuthenticationOk,
                Event::ParameterStatus {
                    name: "DateStyle".into(),
                    value: "ISO, MDY".into(),
                },
                Event::BackendKeyData {
                    process_id: 42,
                    secret_key: 7,
                },
                Event::ReadyForQuery(TransactionStatus::Idle),
            ]))
            .unwrap();
        machine
    }

    fn server_error(severity: &str) -> ErrorFields {
        ErrorFields {
            severity: Some(severity.into()),
            code: Some("42P01".into()),
            message: Some("relation does not exist".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_startup() {
        let mut machine = ConnectionStateMachine::new(Opts {
            user: "alice".into(),
            database: Some("app".into()),
            ..Opts::default()
        });
        assert_eq!(machine.state(), ConnectionState::Connecting);
        machine.start();
        assert_eq!(machine.state(), ConnectionState::Authenticating);
        match sent(&mut machine).as_slice() {
            [FrontendMessage::Startup(params)] => {
                assert!(params.contains(&("user".into(), "alice".into())));
                assert!(params.contains(&("database".into(), "app".into())));
            }
            other => panic!("unexpected {other:?}"),
        }

        let machine = ready_machine();
        assert_eq!(machine.state(), ConnectionState::Ready);
        assert_eq!(machine.backend_key(), Some((42, 7)));
        assert_eq!(machine.server_param("DateStyle"), Some("ISO, MDY"));
    }

    #[test]
    fn test_cleartext_password_required() {
        let mut machine = ConnectionStateMachine::new(Opts::default());
        machine.start();
        let result = machine.receive(&frames(&[Event::AuthenticationCleartextPassword]));
        assert!(matches!(result, Err(Error::Auth(_))));
        assert!(machine.wants_close());
    }

    #[test]
    fn test_queries_wait_for_ready() {
        let mut machine = ConnectionStateMachine::new(Opts::default());
        machine.start();
        machine.take_write_buffer();
        machine.query("SELECT 1", |_| {}).unwrap();
        assert!(sent(&mut machine).is_empty());

        machine
            .receive(&frames(&[
                Event::AuthenticationOk,
                Event::ReadyForQuery(TransactionStatus::Idle),
            ]))
            .unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Query("SELECT 1".into())]);
        assert_eq!(machine.state(), ConnectionState::Busy);
    }

    #[test]
    fn test_legs_run_in_order() {
        let mut machine = ready_machine();
        machine.query("SELECT 1", |_| {}).unwrap();
        machine.query("SELECT 2", |_| {}).unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Query("SELECT 1".into())]);

        // CommandComplete alone does not release the wire
        machine
            .receive(&frames(&[Event::CommandComplete("SELECT 0".into())]))
            .unwrap();
        assert!(sent(&mut machine).is_empty());

        machine
            .receive(&frames(&[Event::ReadyForQuery(TransactionStatus::Idle)]))
            .unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Query("SELECT 2".into())]);
    }

    #[test]
    fn test_error_is_routed_and_connection_survives() {
        let mut machine = ready_machine();
        let outcome = Arc::new(Mutex::new(None));
        let sink = outcome.clone();
        machine
            .query("SELECT * FROM missing", move |r| {
                *sink.lock().unwrap() = Some(r.map(|_| ()))
            })
            .unwrap();
        machine.take_write_buffer();

        machine
            .receive(&frames(&[
                Event::ErrorResponse(server_error("ERROR")),
                Event::ReadyForQuery(TransactionStatus::Idle),
            ]))
            .unwrap();
        let result = outcome.lock().unwrap().take().unwrap();
        assert_eq!(result.unwrap_err().sqlstate(), Some("42P01"));
        assert_eq!(machine.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_error_after_sync_is_async() {
        let mut machine = ready_machine();
        let mut tx = Transaction::new();
        tx.sync();
        machine.submit(tx).unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Sync]);

        // a deferred constraint fails when the implicit transaction ends
        machine
            .receive(&frames(&[
                Event::ErrorResponse(server_error("ERROR")),
                Event::ReadyForQuery(TransactionStatus::Idle),
            ]))
            .unwrap();
        let messages = machine.take_async_messages();
        assert!(matches!(messages.as_slice(), [AsyncMessage::Error(Error::Server(_))]));
        assert!(sent(&mut machine).is_empty());
        assert_eq!(machine.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_prepare_error_sends_sync() {
        let mut machine = ready_machine();
        machine.prepare("SELEC 1", |h| assert!(h.is_err())).unwrap();
        machine.query("SELECT 2", |_| {}).unwrap();
        assert_eq!(sent(&mut machine).len(), 3);

        machine
            .receive(&frames(&[Event::ErrorResponse(server_error("ERROR"))]))
            .unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Sync]);

        machine
            .receive(&frames(&[Event::ReadyForQuery(TransactionStatus::Idle)]))
            .unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Query("SELECT 2".into())]);
    }

    #[test]
    fn test_fatal_fails_everything() {
        let mut machine = ready_machine();
        let failures = Arc::new(Mutex::new(Vec::new()));
        for sql in ["SELECT 1", "SELECT 2"] {
            let failures = failures.clone();
            machine
                .query(sql, move |r| {
                    failures.lock().unwrap().push(matches!(r, Err(Error::FatalServer(_))))
                })
                .unwrap();
        }

        let result = machine.receive(&frames(&[Event::ErrorResponse(server_error("FATAL"))]));
        assert!(matches!(result, Err(Error::FatalServer(_))));
        assert_eq!(*failures.lock().unwrap(), [true, true]);
        assert!(machine.wants_close());
        assert!(matches!(machine.query("SELECT 3", |_| {}), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_data_row_without_listener_is_fatal() {
        let mut machine = ready_machine();
        let result = machine.receive(&frames(&[Event::DataRow(vec![None])]));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_async_messages() {
        let mut machine = ready_machine();
        machine
            .receive(&frames(&[
                Event::NoticeResponse(server_error("NOTICE")),
                Event::NotificationResponse {
                    process_id: 9,
                    channel: "jobs".into(),
                    payload: "1".into(),
                },
                Event::ParameterStatus {
                    name: "DateStyle".into(),
                    value: "German, DMY".into(),
                },
                Event::ErrorResponse(server_error("ERROR")),
            ]))
            .unwrap();

        let messages = machine.take_async_messages();
        assert!(matches!(messages[0], AsyncMessage::Notice(_)));
        assert!(matches!(&messages[1], AsyncMessage::Notification { pid: 9, channel, .. } if channel == "jobs"));
        assert!(matches!(&messages[2], AsyncMessage::ParameterChanged { name, .. } if name == "DateStyle"));
        assert!(matches!(messages[3], AsyncMessage::Error(Error::Server(_))));
        assert_eq!(machine.date_style(), DateStyle::parse("German, DMY"));
        assert_eq!(machine.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_close_drains_queue() {
        let mut machine = ready_machine();
        machine.query("SELECT 1", |_| {}).unwrap();
        machine.close();
        assert_eq!(machine.state(), ConnectionState::Draining);
        assert!(matches!(machine.query("SELECT 2", |_| {}), Err(Error::ConnectionClosed)));
        assert_eq!(sent(&mut machine), [FrontendMessage::Query("SELECT 1".into())]);
        assert!(!machine.wants_close());

        machine
            .receive(&frames(&[
                Event::RowDescription(vec![FieldDescriptor::new("n", oid::INT4)]),
                Event::DataRow(vec![Some(b"1".to_vec())]),
                Event::CommandComplete("SELECT 1".into()),
                Event::ReadyForQuery(TransactionStatus::Idle),
            ]))
            .unwrap();
        assert_eq!(sent(&mut machine), [FrontendMessage::Terminate]);
        assert!(machine.wants_close());
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_lost_fails_pending() {
        let mut machine = ready_machine();
        let outcome = Arc::new(Mutex::new(None));
        let sink = outcome.clone();
        machine
            .query("SELECT pg_sleep(10)", move |r| {
                *sink.lock().unwrap() = Some(matches!(r, Err(Error::ConnectionClosed)))
            })
            .unwrap();
        machine.connection_lost();
        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(machine.state(), ConnectionState::Closed);
    }
}
