//! Tests for the tokio `Conn` against an in-process mock server.
//!
//! The mock decodes frontend frames with `FrontendMessage::parse` and answers
//! with encoded backend events, the way a real server would for the handful
//! of statements the tests use.

#![cfg(feature = "tokio")]

use std::sync::{Arc, Mutex};

use pure_postgres::protocol::backend::FieldDescriptor;
use pure_postgres::protocol::types::oid;
use pure_postgres::protocol::{Event, Frame, FrontendMessage};
use pure_postgres::tokio::Conn;
use pure_postgres::{AsyncMessage, Error, ErrorFields, Opts, Param, TransactionStatus, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Scripted server state for one connection.
#[derive(Default)]
struct MockServer {
    bound: Vec<Param>,
    parsed: Vec<String>,
    /// Drop the socket when this query arrives
    hang_up_on: Option<&'static str>,
}

impl MockServer {
    /// Append the response to `message`; false closes the connection.
    fn respond(&mut self, message: FrontendMessage, out: &mut Vec<u8>) -> bool {
        let events = match message {
            FrontendMessage::Startup(params) => {
                assert!(params.contains(&("user".into(), "tester".into())));
                vec![
                    Event::AuthenticationCleartextPassword,
                ]
            }
            FrontendMessage::Password(password) => {
                assert_eq!(password, "pw");
                vec![
                    Event::AuthenticationOk,
                    Event::ParameterStatus {
                        name: "DateStyle".into(),
                        value: "ISO, MDY".into(),
                    },
                    Event::BackendKeyData {
                        process_id: 4242,
                        secret_key: 99,
                    },
                    Event::ReadyForQuery(TransactionStatus::Idle),
                ]
            }
            FrontendMessage::Query(sql) if Some(sql.as_str()) == self.hang_up_on => return false,
            FrontendMessage::Query(sql) => query_response(&sql),
            FrontendMessage::Parse { query, .. } => {
                self.parsed.push(query);
                vec![Event::ParseComplete]
            }
            FrontendMessage::Describe { .. } => vec![
                Event::ParameterDescription(vec![oid::INT4]),
                Event::RowDescription(vec![FieldDescriptor::new("value", oid::INT4)]),
            ],
            FrontendMessage::Bind { params, .. } => {
                self.bound = params;
                vec![Event::BindComplete]
            }
            FrontendMessage::Execute { .. } => {
                let values = self
                    .bound
                    .iter()
                    .map(|param| match param {
                        Param::Int4(n) => Some(n.to_string().into_bytes()),
                        Param::Null => None,
                        other => panic!("unexpected parameter {other:?}"),
                    })
                    .collect();
                vec![Event::DataRow(values), Event::CommandComplete("SELECT 1".into())]
            }
            FrontendMessage::Flush => Vec::new(),
            FrontendMessage::Sync => vec![Event::ReadyForQuery(TransactionStatus::Idle)],
            FrontendMessage::Terminate => return false,
            other => panic!("unexpected {other:?}"),
        };
        for event in events {
            event.write(out);
        }
        true
    }

    async fn serve(mut self, mut socket: TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut started = false;
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let mut out = Vec::new();
            loop {
                let decoded = if started {
                    Frame::decode(&buf).unwrap()
                } else {
                    Frame::decode_untagged(&buf).unwrap()
                };
                let Some((frame, used)) = decoded else {
                    break;
                };
                started = true;
                buf.drain(..used);
                let message = FrontendMessage::parse(&frame).unwrap();
                if !self.respond(message, &mut out) {
                    socket.write_all(&out).await.unwrap();
                    return;
                }
            }
            socket.write_all(&out).await.unwrap();
        }
    }
}

fn query_response(sql: &str) -> Vec<Event> {
    let mut events = match sql {
        "SELECT 1::int as foobar" => vec![
            Event::RowDescription(vec![FieldDescriptor::new("foobar", oid::INT4)]),
            Event::DataRow(vec![Some(b"1".to_vec())]),
            Event::CommandComplete("SELECT 1".into()),
        ],
        "SELECT broken" => vec![Event::ErrorResponse(ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("42703".into()),
            message: Some("column \"broken\" does not exist".into()),
            ..Default::default()
        })],
        "NOTIFY jobs, 'hello'" => vec![
            Event::CommandComplete("NOTIFY".into()),
            Event::NotificationResponse {
                process_id: 4242,
                channel: "jobs".into(),
                payload: "hello".into(),
            },
        ],
        "BEGIN" => {
            return vec![
                Event::CommandComplete("BEGIN".into()),
                Event::ReadyForQuery(TransactionStatus::InTransaction),
            ];
        }
        other => vec![Event::CommandComplete(
            other.split_whitespace().next().unwrap_or_default().to_string(),
        )],
    };
    events.push(Event::ReadyForQuery(TransactionStatus::Idle));
    events
}

/// Serve one connection on a fresh port.
async fn listen(server: MockServer) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        server.serve(socket).await;
    });
    port
}

async fn start(server: MockServer) -> Conn {
    let port = listen(server).await;
    let url = format!("postgres://tester:pw@127.0.0.1:{port}/app");
    Conn::connect(url.as_str()).await.unwrap()
}

#[tokio::test]
async fn connect_and_query() {
    let conn = start(MockServer::default()).await;
    assert_eq!(conn.server_param("DateStyle").as_deref(), Some("ISO, MDY"));
    assert_eq!(conn.backend_key(), Some((4242, 99)));

    let result = conn.query("SELECT 1::int as foobar").await.unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("foobar"), Some(&Value::Int(1)));

    conn.close().await.unwrap();
    assert!(matches!(conn.query("SELECT 1").await, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn connect_with_opts_value() {
    let port = listen(MockServer::default()).await;
    let opts = Opts {
        port,
        user: "tester".into(),
        password: Some("pw".into()),
        database: Some("app".into()),
        ..Opts::default()
    };

    let conn = Conn::connect(opts).await.unwrap();
    let result = conn.query("SELECT 1::int as foobar").await.unwrap();
    assert_eq!(result.rows[0].get("foobar"), Some(&Value::Int(1)));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn prepared_statements() {
    let conn = start(MockServer::default()).await;

    let result = conn.query_with("SELECT ?::int", vec![5.into()]).await.unwrap();
    assert_eq!(result.rows[0].get("value"), Some(&Value::Int(5)));

    let statement = conn.prepare("SELECT ?::int").await.unwrap();
    assert_eq!(statement.sql(), "SELECT $1::int");
    assert_eq!(statement.param_types(), &[oid::INT4]);

    let result = conn.execute(&statement, vec![7.into()]).await.unwrap();
    assert_eq!(result.rows[0].get("value"), Some(&Value::Int(7)));

    // fewer arguments than parameters are padded with NULL
    let result = conn.execute(&statement, Vec::new()).await.unwrap();
    assert!(result.rows[0].get("value").unwrap().is_null());

    let rejected = conn.execute(&statement, vec![1.into(), 2.into()]).await;
    assert!(matches!(rejected, Err(Error::InvalidUsage(_))));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn pipelined_requests_complete_in_order() {
    let conn = start(MockServer::default()).await;

    let (a, b, c) = tokio::join!(
        conn.query("SELECT 1::int as foobar"),
        conn.query_with("SELECT ?::int", vec![3.into()]),
        conn.query("UPDATE t SET x = 1"),
    );
    assert_eq!(a.unwrap().rows[0].get("foobar"), Some(&Value::Int(1)));
    assert_eq!(b.unwrap().rows[0].get("value"), Some(&Value::Int(3)));
    assert_eq!(c.unwrap().command, "UPDATE");

    conn.close().await.unwrap();
}

#[tokio::test]
async fn transaction_builder() {
    let conn = start(MockServer::default()).await;

    let (selected, updated) = conn
        .transaction(|tx| {
            tx.begin();
            let selected = tx.query_with("SELECT ?::int", vec![11.into()]);
            let updated = tx.query("UPDATE t SET x = 2");
            tx.commit();
            (selected, updated)
        })
        .unwrap();
    assert_eq!(selected.await.unwrap().rows[0].get("value"), Some(&Value::Int(11)));
    assert_eq!(updated.await.unwrap().command, "UPDATE");

    conn.close().await.unwrap();
}

#[tokio::test]
async fn server_error_keeps_connection_usable() {
    let conn = start(MockServer::default()).await;

    let err = conn.query("SELECT broken").await.unwrap_err();
    assert_eq!(err.sqlstate(), Some("42703"));
    assert!(!err.is_fatal());

    let result = conn.query("SELECT 1::int as foobar").await.unwrap();
    assert_eq!(result.rows[0].get("foobar"), Some(&Value::Int(1)));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn notifications_reach_handler() {
    let conn = start(MockServer::default()).await;
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    conn.set_async_message_handler(move |message: AsyncMessage| {
        if let AsyncMessage::Notification { channel, payload, .. } = message {
            sink.lock().unwrap().push((channel, payload));
        }
    })
    .unwrap();

    conn.query("NOTIFY jobs, 'hello'").await.unwrap();
    // the notification is published before the next request is served
    conn.query("SELECT 1::int as foobar").await.unwrap();
    assert_eq!(
        *received.lock().unwrap(),
        [("jobs".to_string(), "hello".to_string())]
    );
    conn.close().await.unwrap();
}

#[tokio::test]
async fn lost_connection_fails_pending_work() {
    let conn = start(MockServer {
        hang_up_on: Some("SELECT pg_sleep(60)"),
        ..MockServer::default()
    })
    .await;

    let result = conn.query("SELECT pg_sleep(60)").await;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert!(matches!(conn.query("SELECT 1").await, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn rejects_bad_url() {
    let result = Conn::connect("mysql://root@localhost/db").await;
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn opts_from_url() {
    let opts = Opts::try_from("pgsql://tester:pw@10.0.0.5/app").unwrap();
    assert_eq!(opts.host, "10.0.0.5");
    assert_eq!(opts.database.as_deref(), Some("app"));
}
