use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Transport and address of an endpoint opened by a [`Server`](crate::server::Server)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    /// TCP listener bound to an address
    Tcp(SocketAddr),
    /// Serial port at a path
    Rtu(String),
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EndpointKind::Tcp(addr) => write!(f, "tcp://{addr}"),
            EndpointKind::Rtu(path) => write!(f, "rtu://{path}"),
        }
    }
}

#[derive(Debug)]
struct Endpoint {
    kind: EndpointKind,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Every endpoint opened so far, closed together
#[derive(Debug, Default)]
pub(crate) struct Endpoints {
    list: Vec<Endpoint>,
}

impl Endpoints {
    pub(crate) fn add(&mut self, kind: EndpointKind, shutdown: mpsc::Sender<()>, task: JoinHandle<()>) {
        tracing::info!("opened endpoint: {}", kind);
        self.list.push(Endpoint {
            kind,
            shutdown,
            task,
        });
    }

    pub(crate) fn kinds(&self) -> Vec<EndpointKind> {
        self.list.iter().map(|x| x.kind.clone()).collect()
    }

    /// stop every endpoint task and wait for it to finish
    pub(crate) async fn close_all(&mut self) {
        for endpoint in self.list.drain(..) {
            let Endpoint {
                kind,
                shutdown,
                task,
            } = endpoint;

            // the task exits once every sender is gone
            drop(shutdown);
            if let Err(err) = task.await {
                tracing::warn!("endpoint {} did not stop cleanly: {}", kind, err);
            }
            tracing::info!("closed endpoint: {}", kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_all_stops_every_task() {
        let mut endpoints = Endpoints::default();
        let mut receivers = Vec::new();
        for port in [5020u16, 5021] {
            let (tx, mut rx) = mpsc::channel::<()>(1);
            let (done_tx, done_rx) = tokio::sync::oneshot::channel();
            let task = tokio::spawn(async move {
                rx.recv().await;
                let _ = done_tx.send(());
            });
            endpoints.add(
                EndpointKind::Tcp(SocketAddr::from(([127, 0, 0, 1], port))),
                tx,
                task,
            );
            receivers.push(done_rx);
        }
        assert_eq!(
            endpoints.kinds(),
            vec![
                EndpointKind::Tcp(SocketAddr::from(([127, 0, 0, 1], 5020))),
                EndpointKind::Tcp(SocketAddr::from(([127, 0, 0, 1], 5021))),
            ]
        );

        endpoints.close_all().await;

        assert!(endpoints.kinds().is_empty());
        for rx in receivers {
            rx.await.unwrap();
        }
    }

    #[test]
    fn formats_endpoint_kinds() {
        assert_eq!(
            EndpointKind::Tcp(SocketAddr::from(([127, 0, 0, 1], 502))).to_string(),
            "tcp://127.0.0.1:502"
        );
        assert_eq!(
            EndpointKind::Rtu("/dev/ttyUSB0".to_string()).to_string(),
            "rtu:///dev/ttyUSB0"
        );
    }
}
