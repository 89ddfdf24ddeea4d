use tokio::sync::mpsc;

use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::Error;
use crate::serial::parser::RtuParser;
use crate::server::session::{SessionMode, SessionTask};
use crate::server::task::RequestSender;

/// Serves requests on an opened serial port until shutdown or an I/O error
pub(crate) struct RtuServerTask {
    session: SessionTask<RtuParser>,
}

impl RtuServerTask {
    pub(crate) fn new(
        port: tokio_serial::SerialStream,
        sender: RequestSender,
        shutdown: mpsc::Receiver<()>,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            session: SessionTask::new(
                PhysLayer::new_serial(port),
                RtuParser::new(),
                sender,
                shutdown,
                SessionMode::Rtu,
                decode,
            ),
        }
    }

    pub(crate) async fn run(mut self) {
        match self.session.run().await {
            Error::Shutdown => tracing::info!("serial server shutdown"),
            err => tracing::warn!("serial port closed: {}", err),
        }
    }
}
