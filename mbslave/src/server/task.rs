use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::{mpsc, oneshot};

use crate::decode::PduDecodeLevel;
use crate::error::{ConfigError, Error};
use crate::frame::{Frame, FrameDisplay};
use crate::server::dispatch::ServerState;
use crate::server::store::RegisterStore;
use crate::server::table::BoxedHandler;
use crate::types::UnitId;

/// Runs on the dispatch task, never unwinds
type Transaction = Box<dyn FnOnce(&mut RegisterStore) + Send>;

/// Where the dispatch task delivers the serialized response of a request
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    reply: oneshot::Sender<Vec<u8>>,
}

impl ConnectionHandle {
    fn send(self, bytes: Vec<u8>) -> Result<(), Vec<u8>> {
        self.reply.send(bytes)
    }
}

pub(crate) enum Message {
    Request(Box<dyn Frame>, ConnectionHandle),
    Register {
        unit_id: UnitId,
        function: u8,
        handler: BoxedHandler,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Transaction(Transaction),
    Shutdown,
}

/// The single consumer of the request queue, owns the [`ServerState`]
pub(crate) struct DispatchTask {
    state: ServerState,
    rx: mpsc::Receiver<Message>,
    decode: PduDecodeLevel,
}

impl DispatchTask {
    pub(crate) fn new(
        state: ServerState,
        rx: mpsc::Receiver<Message>,
        decode: PduDecodeLevel,
    ) -> Self {
        Self { state, rx, decode }
    }

    pub(crate) async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Request(frame, conn) => self.handle_request(frame.as_ref(), conn),
                Message::Register {
                    unit_id,
                    function,
                    handler,
                    reply,
                } => {
                    let result = self.state.register_boxed(unit_id, function, handler);
                    match &result {
                        Ok(()) => tracing::info!(
                            "registered handler for function code {:#04X} on unit id: {}",
                            function,
                            unit_id
                        ),
                        Err(err) => tracing::warn!("{}", err),
                    }
                    let _ = reply.send(result);
                }
                Message::Transaction(transaction) => transaction(self.state.store_mut()),
                Message::Shutdown => {
                    tracing::info!("dispatch task shutdown");
                    return;
                }
            }
        }
        tracing::info!("all request senders dropped, dispatch task shutdown");
    }

    fn handle_request(&mut self, request: &dyn Frame, conn: ConnectionHandle) {
        if self.decode.enabled() {
            tracing::info!(
                "PDU RX - {}",
                FrameDisplay::new(request, self.decode.data_enabled())
            );
        }

        let response = self.state.dispatch(request);

        if self.decode.enabled() {
            tracing::info!(
                "PDU TX - {}",
                FrameDisplay::new(response.as_ref(), self.decode.data_enabled())
            );
        }

        if conn.send(response.serialize()).is_err() {
            tracing::warn!(
                "connection closed before response to unit id {} could be delivered",
                request.unit_id()
            );
        }
    }
}

/// Handle used to queue requests for the dispatch task
///
/// Requests from every sender are dispatched one at a time in the order they were queued.
/// Clones share the same queue.
#[derive(Clone, Debug)]
pub struct RequestSender {
    tx: mpsc::Sender<Message>,
}

/// Response to a request that has been queued with [`RequestSender::enqueue`]
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Vec<u8>>,
}

impl PendingResponse {
    /// Wait for the dispatch task to produce the serialized response frame
    ///
    /// Fails with [`Error::Shutdown`] if the dispatch task stopped before reaching the request.
    pub async fn wait(self) -> Result<Vec<u8>, Error> {
        Ok(self.rx.await?)
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Message::Request(frame, _) => f.debug_tuple("Request").field(frame).finish(),
            Message::Register {
                unit_id, function, ..
            } => f
                .debug_struct("Register")
                .field("unit_id", unit_id)
                .field("function", function)
                .finish_non_exhaustive(),
            Message::Transaction(_) => f.write_str("Transaction"),
            Message::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl RequestSender {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Queue a request, suspending only while the queue is full
    pub async fn enqueue(&self, frame: Box<dyn Frame>) -> Result<PendingResponse, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Request(frame, ConnectionHandle { reply }))
            .await?;
        Ok(PendingResponse { rx })
    }

    /// Queue a request and wait for its serialized response
    pub async fn submit(&self, frame: Box<dyn Frame>) -> Result<Vec<u8>, Error> {
        self.enqueue(frame).await?.wait().await
    }

    pub(crate) async fn register(
        &self,
        unit_id: UnitId,
        function: u8,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Register {
                unit_id,
                function,
                handler,
                reply,
            })
            .await?;
        rx.await??;
        Ok(())
    }

    pub(crate) async fn transaction<F, R>(&self, transaction: F) -> Result<R, Error>
    where
        F: FnOnce(&mut RegisterStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Transaction(Box::new(move |store| {
                let result = catch_unwind(AssertUnwindSafe(|| transaction(store))).map_err(|_| {
                    tracing::error!("store transaction panicked");
                    Error::TransactionPanicked
                });
                let _ = reply.send(result);
            })))
            .await?;
        rx.await?
    }

    pub(crate) async fn shutdown(&self) -> Result<(), Error> {
        self.tx.send(Message::Shutdown).await?;
        Ok(())
    }
}
