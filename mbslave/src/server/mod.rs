//! Modbus slave engine
//!
//! A [`Server`] owns a single dispatch task. Transports (TCP listeners and serial ports) decode
//! requests and queue them for that task, which runs the bound [`FunctionHandler`] against the
//! [`RegisterStore`] and hands the serialized response back to the transport. Requests from all
//! connections are processed one at a time in the order they were queued, so handlers never
//! race with each other.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::Error;
use crate::types::UnitId;

mod dispatch;
mod handler;
pub mod handlers;
mod lifecycle;
pub(crate) mod session;
mod store;
mod table;
pub(crate) mod task;
mod types;

// re-export to the public API
pub use dispatch::ServerState;
pub use handler::*;
pub use lifecycle::EndpointKind;
pub use store::*;
pub use task::{PendingResponse, RequestSender};
pub use types::*;

/// A running Modbus slave: the dispatch task plus every endpoint opened through it
///
/// Must be created from within a Tokio runtime. Dropping the server without calling
/// [`Server::close`] leaves the endpoints and the dispatch task running.
#[derive(Debug)]
pub struct Server {
    sender: RequestSender,
    task: JoinHandle<()>,
    endpoints: lifecycle::Endpoints,
    config: ServerConfig,
}

impl Server {
    /// Create the state for the given unit ids and spawn the dispatch task
    pub fn new(unit_ids: &[UnitId], config: ServerConfig) -> Self {
        Self::spawn(ServerState::new(unit_ids), config)
    }

    /// Spawn the dispatch task which takes ownership of an existing state
    pub fn spawn(state: ServerState, config: ServerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(
            task::DispatchTask::new(state, rx, config.decode.pdu)
                .run()
                .instrument(tracing::info_span!("Modbus-Server-Dispatch")),
        );
        Self {
            sender: RequestSender::new(tx),
            task,
            endpoints: lifecycle::Endpoints::default(),
            config,
        }
    }

    /// Bind a handler to a function code of a device
    ///
    /// The registration is queued behind any pending requests, which are still dispatched with
    /// the previous binding. Fails with [`Error::Config`] if the unit id is unknown.
    pub async fn register_handler<H>(
        &self,
        unit_id: UnitId,
        function: u8,
        handler: H,
    ) -> Result<(), Error>
    where
        H: FunctionHandler,
    {
        self.sender
            .register(unit_id, function, Box::new(handler))
            .await
    }

    /// Run a closure against the register store on the dispatch task and return its result
    ///
    /// A closure that panics yields [`Error::TransactionPanicked`], the dispatch task keeps
    /// running. [`Error::Shutdown`] means the server is closed.
    ///
    /// ```no_run
    /// use mbslave::*;
    /// use mbslave::server::*;
    ///
    /// # async fn run() -> Result<(), Error> {
    /// let server = Server::new(&[UnitId::new(1)], ServerConfig::default());
    /// server
    ///     .transaction(|store| {
    ///         if let Some(device) = store.get_mut(UnitId::new(1)) {
    ///             device.input_registers_mut()[0] = 42;
    ///         }
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<F, R>(&self, transaction: F) -> Result<R, Error>
    where
        F: FnOnce(&mut RegisterStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.sender.transaction(transaction).await
    }

    /// Handle for queuing requests directly, e.g. from a custom transport
    pub fn sender(&self) -> RequestSender {
        self.sender.clone()
    }

    /// Bind a TCP listener and start accepting connections, returning the bound address
    ///
    /// Binding to port 0 picks a free port.
    pub async fn listen_tcp(&mut self, addr: SocketAddr) -> Result<SocketAddr, Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(1);
        let mut listener = crate::tcp::server::ServerTask::new(
            self.config.max_sessions,
            listener,
            self.sender.clone(),
            self.config.decode,
        );
        let task = tokio::spawn(
            async move { listener.run(rx).await }
                .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?local)),
        );

        self.endpoints.add(EndpointKind::Tcp(local), tx, task);
        Ok(local)
    }

    /// Open a serial port and serve Modbus RTU requests on it
    ///
    /// Broadcast requests are dispatched but never answered. The endpoint stops on the first
    /// I/O error of the port.
    #[cfg(feature = "serial")]
    pub fn listen_rtu(
        &mut self,
        path: &str,
        settings: crate::serial::SerialSettings,
    ) -> Result<(), Error> {
        let port = crate::serial::open(path, settings).map_err(std::io::Error::from)?;

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(
            crate::serial::server::RtuServerTask::new(port, self.sender.clone(), rx, self.config.decode)
                .run()
                .instrument(tracing::info_span!("Modbus-Server-RTU", "port" = ?path)),
        );

        self.endpoints
            .add(EndpointKind::Rtu(path.to_string()), tx, task);
        Ok(())
    }

    /// Endpoints opened so far
    pub fn endpoints(&self) -> Vec<EndpointKind> {
        self.endpoints.kinds()
    }

    /// Close every endpoint, then stop the dispatch task according to the [`ShutdownPolicy`]
    ///
    /// Once this returns, no further request is dispatched.
    pub async fn close(mut self) {
        self.endpoints.close_all().await;

        match self.config.shutdown {
            ShutdownPolicy::Drain => {
                if self.sender.shutdown().await.is_err() {
                    tracing::warn!("dispatch task already stopped");
                }
            }
            ShutdownPolicy::Abort => self.task.abort(),
        }

        match self.task.await {
            Err(err) if !err.is_cancelled() => {
                tracing::error!("dispatch task failed: {}", err)
            }
            _ => tracing::info!("server closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::tcp::TcpFrame;

    const UNIT: UnitId = UnitId::new(1);

    fn write_coil(tx_id: u16, index: u16) -> Box<dyn Frame> {
        let mut data = index.to_be_bytes().to_vec();
        data.extend_from_slice(&[0xFF, 0x00]);
        Box::new(TcpFrame::new(tx_id, UNIT, 0x05, &data))
    }

    #[tokio::test]
    async fn registration_and_transactions_are_queued() {
        let server = Server::new(&[UNIT], ServerConfig::default());

        server
            .register_handler(UNIT, 99, handler_fn(|_, _| Ok(vec![0x01])))
            .await
            .unwrap();
        let err = server
            .register_handler(UnitId::new(2), 99, handler_fn(|_, _| Ok(vec![0x01])))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Config(crate::error::ConfigError::UnknownUnitId(UnitId::new(2)))
        );
        assert!(err.to_string().contains("0x02"));

        server
            .transaction(|store| store.get_mut(UNIT).unwrap().input_registers_mut()[3] = 7)
            .await
            .unwrap();

        let response = server
            .sender()
            .submit(Box::new(TcpFrame::new(1, UNIT, 0x04, &[0x00, 0x03, 0x00, 0x01])))
            .await
            .unwrap();
        assert_eq!(&response[7..], &[0x04, 0x02, 0x00, 0x07]);

        server.close().await;
    }

    #[tokio::test]
    async fn drain_answers_queued_requests() {
        let server = Server::new(&[UNIT], ServerConfig::default());
        let sender = server.sender();

        let mut pending = Vec::new();
        for i in 0..8 {
            pending.push(sender.enqueue(write_coil(i, i)).await.unwrap());
        }

        server.close().await;

        for response in pending {
            assert!(response.wait().await.is_ok());
        }
        assert_eq!(sender.submit(write_coil(9, 9)).await, Err(Error::Shutdown));
    }

    #[tokio::test]
    async fn abort_drops_queued_requests() {
        let config = ServerConfig {
            shutdown: ShutdownPolicy::Abort,
            ..Default::default()
        };
        // nothing runs until this test yields, so the queue is still full when aborting
        let server = Server::new(&[UNIT], config);
        let sender = server.sender();

        let mut pending = Vec::new();
        for i in 0..8 {
            pending.push(sender.enqueue(write_coil(i, i)).await.unwrap());
        }

        server.close().await;

        for response in pending {
            assert_eq!(response.wait().await, Err(Error::Shutdown));
        }
        assert_eq!(sender.submit(write_coil(9, 9)).await, Err(Error::Shutdown));
    }

    #[tokio::test]
    async fn close_stops_tcp_listener() {
        let mut server = Server::new(&[UNIT], ServerConfig::default());
        let addr = server
            .listen_tcp(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        assert_eq!(server.endpoints(), vec![EndpointKind::Tcp(addr)]);

        server.close().await;

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
