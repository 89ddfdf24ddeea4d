use tokio::sync::mpsc;

use crate::common::phys::PhysLayer;
use crate::common::reader::{FrameParser, FramedReader};
use crate::decode::{AduDecodeLevel, DecodeLevel};
use crate::error::Error;
use crate::server::task::RequestSender;
use crate::types::UnitId;

/// How a session reacts to bad frames and broadcasts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SessionMode {
    /// bad frames close the session
    Tcp,
    /// bad frames are discarded and broadcasts are never answered
    #[cfg(feature = "serial")]
    Rtu,
}

impl SessionMode {
    fn discards_bad_frames(self) -> bool {
        match self {
            SessionMode::Tcp => false,
            #[cfg(feature = "serial")]
            SessionMode::Rtu => true,
        }
    }

    fn answers_broadcasts(self) -> bool {
        match self {
            SessionMode::Tcp => true,
            #[cfg(feature = "serial")]
            SessionMode::Rtu => false,
        }
    }
}

/// Reads requests from one connection or serial port, hands them to the dispatch task
/// and writes back the responses
pub(crate) struct SessionTask<T>
where
    T: FrameParser,
{
    io: PhysLayer,
    reader: FramedReader<T>,
    sender: RequestSender,
    shutdown: mpsc::Receiver<()>,
    mode: SessionMode,
    decode: DecodeLevel,
}

impl<T> SessionTask<T>
where
    T: FrameParser,
{
    pub(crate) fn new(
        io: PhysLayer,
        parser: T,
        sender: RequestSender,
        shutdown: mpsc::Receiver<()>,
        mode: SessionMode,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            io,
            reader: FramedReader::new(parser),
            sender,
            shutdown,
            mode,
            decode,
        }
    }

    /// run until the session fails or is told to shut down, returning the reason
    pub(crate) async fn run(&mut self) -> Error {
        loop {
            if let Err(err) = self.run_one().await {
                match err {
                    Error::BadFrame(_) | Error::Internal(_) if self.mode.discards_bad_frames() => {
                        tracing::warn!("discarding received data: {}", err);
                        self.reader.reset();
                    }
                    _ => return err,
                }
            }
        }
    }

    async fn run_one(&mut self) -> Result<(), Error> {
        let request = tokio::select! {
            frame = self.reader.next_frame(&mut self.io, self.decode.adu, self.decode.physical) => frame?,
            _ = self.shutdown.recv() => return Err(Error::Shutdown),
        };

        let unit_id = request.unit_id();

        let response = tokio::select! {
            response = self.sender.submit(request) => response?,
            _ = self.shutdown.recv() => return Err(Error::Shutdown),
        };

        if unit_id == UnitId::broadcast() && !self.mode.answers_broadcasts() {
            tracing::debug!("broadcast request processed, no response sent");
            return Ok(());
        }

        if self.decode.adu.enabled() {
            tracing::info!(
                "{} TX - {}",
                T::NAME,
                AduDisplay::new(self.decode.adu, &response)
            );
        }

        self.io.write(&response, self.decode.physical).await?;
        Ok(())
    }
}

struct AduDisplay<'a> {
    level: AduDecodeLevel,
    bytes: &'a [u8],
}

impl<'a> AduDisplay<'a> {
    fn new(level: AduDecodeLevel, bytes: &'a [u8]) -> Self {
        Self { level, bytes }
    }
}

impl std::fmt::Display for AduDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "len: {}", self.bytes.len())?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::decode::PduDecodeLevel;
    use crate::server::dispatch::ServerState;
    use crate::server::task::DispatchTask;
    use crate::tcp::frame::MbapParser;

    const UNIT: UnitId = UnitId::new(1);

    fn dispatcher() -> RequestSender {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(
            DispatchTask::new(ServerState::new(&[UNIT]), rx, PduDecodeLevel::Nothing).run(),
        );
        RequestSender::new(tx)
    }

    async fn run_session<T: FrameParser>(io: PhysLayer, parser: T, mode: SessionMode) -> Error {
        let (_tx, rx) = mpsc::channel(1);
        SessionTask::new(io, parser, dispatcher(), rx, mode, DecodeLevel::nothing())
            .run()
            .await
    }

    fn mock(io: &mut Builder) -> PhysLayer {
        PhysLayer::new_mock(io.build())
    }

    #[tokio::test]
    async fn tcp_session_answers_requests() {
        let mut io = Builder::new();
        io.read(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x07, 0xFF, 0x00])
            .write(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x07, 0xFF, 0x00])
            .read(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x07, 0x00, 0x01])
            .write(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01]);

        let err = run_session(mock(&mut io), MbapParser::new(), SessionMode::Tcp).await;
        assert_eq!(err, Error::Io(std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn tcp_session_closes_on_bad_frame() {
        let mut io = Builder::new();
        io.read(&[0x00, 0x01, 0xCA, 0xFE, 0x00, 0x06, 0x01]);

        let err = run_session(mock(&mut io), MbapParser::new(), SessionMode::Tcp).await;
        assert!(matches!(err, Error::BadFrame(_)));
    }

    #[tokio::test]
    async fn session_stops_when_shutdown_sender_is_dropped() {
        let (io, _handle) = Builder::new().build_with_handle();
        let (tx, rx) = mpsc::channel(1);
        let mut session = SessionTask::new(
            PhysLayer::new_mock(io),
            MbapParser::new(),
            dispatcher(),
            rx,
            SessionMode::Tcp,
            DecodeLevel::nothing(),
        );

        drop(tx);
        assert_eq!(session.run().await, Error::Shutdown);
    }

    #[cfg(feature = "serial")]
    mod rtu {
        use tokio::time::Duration;

        use super::*;
        use crate::frame::Frame;
        use crate::serial::parser::RtuParser;
        use crate::serial::RtuFrame;

        fn rtu(unit_id: u8, function: u8, data: &[u8]) -> Vec<u8> {
            RtuFrame::new(UnitId::new(unit_id), function, data).serialize()
        }

        #[tokio::test]
        async fn rtu_session_does_not_answer_broadcasts() {
            let mut io = Builder::new();
            io.read(&rtu(0, 0x06, &[0x00, 0x01, 0x12, 0x34]))
                .read(&rtu(1, 0x03, &[0x00, 0x01, 0x00, 0x01]))
                .write(&rtu(1, 0x03, &[0x02, 0x00, 0x00]));

            let err = run_session(mock(&mut io), RtuParser::new(), SessionMode::Rtu).await;
            assert_eq!(err, Error::Io(std::io::ErrorKind::UnexpectedEof));
        }

        #[tokio::test]
        async fn rtu_session_discards_bad_frames() {
            let mut corrupted = rtu(1, 0x06, &[0x00, 0x01, 0x12, 0x34]);
            corrupted[5] ^= 0xFF;

            let mut io = Builder::new();
            io.read(&corrupted)
                .read(&rtu(1, 0x06, &[0x00, 0x01, 0x12, 0x34]))
                .write(&rtu(1, 0x06, &[0x00, 0x01, 0x12, 0x34]));

            let err = run_session(mock(&mut io), RtuParser::new(), SessionMode::Rtu).await;
            assert_eq!(err, Error::Io(std::io::ErrorKind::UnexpectedEof));
        }

        #[tokio::test(start_paused = true)]
        async fn rtu_session_answers_custom_function_split_across_reads() {
            let request = rtu(1, 0x41, &[0x01, 0x02, 0x03, 0x04]);

            // 0x41 is not bound on the unit, so the answer is an illegal function exception
            let mut io = Builder::new();
            io.read(&request[..5])
                .read(&request[5..])
                .write(&rtu(1, 0xC1, &[0x01]));

            let phys = PhysLayer::new_mock_serial(io.build(), Duration::from_millis(2));
            let err = run_session(phys, RtuParser::new(), SessionMode::Rtu).await;
            assert_eq!(err, Error::Io(std::io::ErrorKind::UnexpectedEof));
        }
    }
}
