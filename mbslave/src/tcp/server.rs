use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::server::session::{SessionMode, SessionTask};
use crate::server::task::RequestSender;
use crate::tcp::frame::MbapParser;

struct SessionTracker {
    max: usize,
    id: u64,
    sessions: BTreeMap<u64, mpsc::Sender<()>>,
}

type SessionTrackerWrapper = Arc<Mutex<SessionTracker>>;

impl SessionTracker {
    fn new(max: usize) -> SessionTracker {
        Self {
            max,
            id: 0,
            sessions: BTreeMap::new(),
        }
    }

    fn get_next_id(&mut self) -> u64 {
        let ret = self.id;
        self.id += 1;
        ret
    }

    fn wrapped(max: usize) -> SessionTrackerWrapper {
        Arc::new(Mutex::new(Self::new(max)))
    }

    fn add(&mut self, sender: mpsc::Sender<()>) -> u64 {
        if self.sessions.len() >= self.max {
            // when the record drops, and there are no more senders,
            // the other end will stop the task
            if let Some((id, _)) = self.sessions.pop_first() {
                tracing::warn!("exceeded max connections, closing oldest session: {}", id);
            }
        }

        let id = self.get_next_id();
        self.sessions.insert(id, sender);
        id
    }

    fn remove(&mut self, id: u64) {
        self.sessions.remove(&id);
    }

    fn clear(&mut self) {
        self.sessions.clear();
    }
}

/// Accepts connections on a bound listener and spawns a session for each of them
pub(crate) struct ServerTask {
    listener: TcpListener,
    sender: RequestSender,
    tracker: SessionTrackerWrapper,
    decode: DecodeLevel,
}

impl ServerTask {
    pub(crate) fn new(
        max_sessions: usize,
        listener: TcpListener,
        sender: RequestSender,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            listener,
            sender,
            tracker: SessionTracker::wrapped(max_sessions.max(1)),
            decode,
        }
    }

    pub(crate) async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
               _ = shutdown.recv() => {
                    tracing::info!("server shutdown");
                    break; // shutdown signal
               }
               result = self.listener.accept() => {
                   match result {
                        Err(err) => {
                            tracing::error!("error accepting connection: {}", err);
                            break;
                        }
                        Ok((socket, addr)) => {
                            self.handle(socket, addr).await
                        }
                   }
               }
            }
        }

        // sessions end once their shutdown sender is dropped
        self.tracker.lock().await.clear();
    }

    async fn handle(&self, socket: TcpStream, addr: SocketAddr) {
        let phys = PhysLayer::new_tcp(socket);
        let sender = self.sender.clone();
        let decode = self.decode;
        let tracker = self.tracker.clone();
        let (tx, rx) = mpsc::channel(1);

        let id = self.tracker.lock().await.add(tx);

        tracing::info!("accepted connection {} from: {}", id, addr);

        tokio::spawn(
            async move {
                let reason =
                    SessionTask::new(phys, MbapParser::new(), sender, rx, SessionMode::Tcp, decode)
                        .run()
                        .await;
                tracing::info!("shutdown session: {} ({})", id, reason);
                tracker.lock().await.remove(id);
            }
            .instrument(tracing::info_span!("Session", "remote" = ?addr)),
        );
    }
}
