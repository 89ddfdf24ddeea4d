use std::fmt::Write;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Duration, Instant};

use crate::decode::PhysDecodeLevel;

enum Stream {
    Tcp(tokio::net::TcpStream),
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
    #[cfg(test)]
    Mock(tokio_test::io::Mock),
}

/// Byte stream under a session, with the RTU line timing when it is a serial port
pub(crate) struct PhysLayer {
    stream: Stream,
    /// minimum silence that separates two frames, `None` on TCP
    silence: Option<Duration>,
    last_activity: Option<Instant>,
}

impl PhysLayer {
    pub(crate) fn new_tcp(socket: tokio::net::TcpStream) -> Self {
        Self::new(Stream::Tcp(socket), None)
    }

    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(port: tokio_serial::SerialStream) -> Self {
        let silence = inter_frame_delay(&port);
        Self::new(Stream::Serial(port), Some(silence))
    }

    #[cfg(test)]
    pub(crate) fn new_mock(mock: tokio_test::io::Mock) -> Self {
        Self::new(Stream::Mock(mock), None)
    }

    /// mock that behaves like a serial line with the given inter-frame silence
    #[cfg(test)]
    pub(crate) fn new_mock_serial(mock: tokio_test::io::Mock, silence: Duration) -> Self {
        Self::new(Stream::Mock(mock), Some(silence))
    }

    fn new(stream: Stream, silence: Option<Duration>) -> Self {
        Self {
            stream,
            silence,
            last_activity: None,
        }
    }

    pub(crate) fn silence(&self) -> Option<Duration> {
        self.silence
    }

    pub(crate) async fn read(
        &mut self,
        buffer: &mut [u8],
        level: PhysDecodeLevel,
    ) -> Result<usize, std::io::Error> {
        let count = match &mut self.stream {
            Stream::Tcp(x) => x.read(buffer).await?,
            #[cfg(feature = "serial")]
            Stream::Serial(x) => x.read(buffer).await?,
            #[cfg(test)]
            Stream::Mock(x) => x.read(buffer).await?,
        };
        self.last_activity = Some(Instant::now());

        if level.enabled() {
            if let Some(data) = buffer.get(..count) {
                tracing::info!("PHYS RX - {}", PhysDisplay::new(level, data));
            }
        }

        Ok(count)
    }

    pub(crate) async fn write(
        &mut self,
        data: &[u8],
        level: PhysDecodeLevel,
    ) -> Result<(), std::io::Error> {
        if let (Some(silence), Some(last)) = (self.silence, self.last_activity) {
            tokio::time::sleep_until(last + silence).await;
        }

        if level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(level, data));
        }

        match &mut self.stream {
            Stream::Tcp(x) => x.write_all(data).await?,
            #[cfg(feature = "serial")]
            Stream::Serial(x) => x.write_all(data).await?,
            #[cfg(test)]
            Stream::Mock(x) => x.write_all(data).await?,
        }
        self.last_activity = Some(Instant::now());
        Ok(())
    }
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match &self.stream {
            Stream::Tcp(_) => "Tcp",
            #[cfg(feature = "serial")]
            Stream::Serial(_) => "Serial",
            #[cfg(test)]
            Stream::Mock(_) => "Mock",
        };
        f.debug_struct("PhysLayer")
            .field("stream", &name)
            .field("silence", &self.silence)
            .finish()
    }
}

/// 3.5 character times, fixed at 1.75 ms above 19200 baud
#[cfg(feature = "serial")]
fn inter_frame_delay(port: &tokio_serial::SerialStream) -> Duration {
    use tokio_serial::SerialPort;

    // start, 8 data, parity or stop, stop
    const BITS_PER_CHAR: u64 = 11;
    const FIXED_ABOVE_BAUD: u32 = 19200;
    const FIXED_DELAY: Duration = Duration::from_micros(1750);

    match port.baud_rate() {
        Ok(baud) if baud > 0 && baud <= FIXED_ABOVE_BAUD => {
            Duration::from_secs(BITS_PER_CHAR) * 7 / (2 * baud)
        }
        Ok(_) => FIXED_DELAY,
        Err(err) => {
            tracing::warn!(
                "unable to read the baud rate ({}), using a {} us inter-frame delay",
                err,
                FIXED_DELAY.as_micros()
            );
            FIXED_DELAY
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        Self { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

/// hex dump, one line per 18 bytes
pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for line in bytes.chunks(18) {
        writeln!(f)?;
        for (i, byte) in line.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            write!(f, "{byte:02X}")?;
        }
    }
    Ok(())
}
