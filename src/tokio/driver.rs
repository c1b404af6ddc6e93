//! Driver task: owns the socket and the state machine of one connection.

use tokio::sync::{mpsc, oneshot, watch};

use crate::handler::AsyncMessageHandler;
use crate::protocol::types::TransactionStatus;
use crate::state::{ConnectionStateMachine, Transaction};

use super::stream::Stream;

/// Work sent from [`Conn`](super::Conn) to the driver.
pub(crate) enum Request {
    Submit(Transaction),
    /// Graceful close; the sender fires once the socket is shut down
    Close(oneshot::Sender<()>),
    SetHandler(Option<Box<dyn AsyncMessageHandler>>),
}

/// Connection state visible to [`Conn`](super::Conn) without a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub server_params: Vec<(String, String)>,
    pub transaction_status: TransactionStatus,
    pub backend_key: Option<(u32, u32)>,
}

impl Snapshot {
    pub fn of(machine: &ConnectionStateMachine) -> Self {
        Self {
            server_params: machine.server_params().to_vec(),
            transaction_status: machine.transaction_status(),
            backend_key: machine.backend_key(),
        }
    }
}

pub(crate) struct Driver {
    stream: Stream,
    machine: ConnectionStateMachine,
    requests: mpsc::UnboundedReceiver<Request>,
    snapshot: watch::Sender<Snapshot>,
    handler: Option<Box<dyn AsyncMessageHandler>>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl Driver {
    pub fn new(
        stream: Stream,
        machine: ConnectionStateMachine,
        requests: mpsc::UnboundedReceiver<Request>,
        snapshot: watch::Sender<Snapshot>,
    ) -> Self {
        Self {
            stream,
            machine,
            requests,
            snapshot,
            handler: None,
            close_waiters: Vec::new(),
        }
    }

    /// Run until the connection is closed.
    pub async fn run(mut self) {
        let mut accepting = true;

        loop {
            let out = self.machine.take_write_buffer();
            if let Err(error) = self.stream.write_all(&out).await {
                tracing::warn!(%error, "write failed");
                self.machine.connection_lost();
            }
            self.publish();
            if self.machine.wants_close() {
                break;
            }

            tokio::select! {
                request = self.requests.recv(), if accepting => match request {
                    Some(Request::Submit(tx)) => {
                        if let Err(error) = self.machine.submit(tx) {
                            tracing::debug!(%error, "transaction rejected");
                        }
                    }
                    Some(Request::Close(done)) => {
                        self.close_waiters.push(done);
                        self.machine.close();
                    }
                    Some(Request::SetHandler(handler)) => self.handler = handler,
                    None => {
                        tracing::debug!("every handle dropped, closing");
                        accepting = false;
                        self.machine.close();
                    }
                },
                chunk = self.stream.read_chunk() => match chunk {
                    Ok([]) => {
                        tracing::debug!("server closed the connection");
                        self.machine.connection_lost();
                    }
                    Ok(chunk) => {
                        if let Err(error) = self.machine.receive(chunk) {
                            tracing::warn!(%error, "closing connection");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "read failed");
                        self.machine.connection_lost();
                    }
                },
            }
        }

        if let Err(error) = self.stream.shutdown().await {
            tracing::debug!(%error, "shutdown failed");
        }
        self.requests.close();
        self.machine.connection_lost();
        self.publish();
        for done in self.close_waiters.drain(..) {
            // the closer may have stopped waiting
            let _ = done.send(());
        }
    }

    /// Forward async messages and refresh the snapshot.
    fn publish(&mut self) {
        for message in self.machine.take_async_messages() {
            match self.handler.as_mut() {
                Some(handler) => handler.handle(message),
                None => tracing::debug!(?message, "async message without handler"),
            }
        }

        let current = Snapshot::of(&self.machine);
        self.snapshot.send_if_modified(|snapshot| {
            if *snapshot == current {
                return false;
            }
            *snapshot = current;
            true
        });
    }
}
