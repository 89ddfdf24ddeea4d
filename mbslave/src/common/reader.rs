use crate::common::buffer::ReadBuffer;
use crate::common::phys::PhysLayer;
use crate::decode::{AduDecodeLevel, PhysDecodeLevel};
use crate::error::Error;
use crate::frame::Frame;

/// Defines an interface for reading complete frames (TCP or RTU) off a byte stream
pub(crate) trait FrameParser: Send + 'static {
    /// prefix used when logging frames at the ADU level
    const NAME: &'static str;

    fn max_frame_size(&self) -> usize;

    /// Parse bytes using the provided buffer. Advancing the buffer always implies that the bytes
    /// are consumed and can be discarded.
    ///
    /// Err implies the input data is invalid
    /// Ok(None) implies that more data is required to complete parsing
    /// Ok(Some(..)) will contain a fully parsed frame and will advance the buffer appropriately
    fn parse(
        &mut self,
        buffer: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error>;

    /// Forget any partially parsed header
    fn reset(&mut self);

    /// True when the frame being parsed has no length information and ends only when the line
    /// goes silent
    fn awaiting_silence(&self) -> bool {
        false
    }

    /// Called once the line has been silent for the inter-frame delay, frames whatever is
    /// buffered
    fn parse_on_silence(
        &mut self,
        _buffer: &mut ReadBuffer,
        _level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error> {
        Ok(None)
    }
}

pub(crate) struct FramedReader<T>
where
    T: FrameParser,
{
    parser: T,
    buffer: ReadBuffer,
}

impl<T: FrameParser> FramedReader<T> {
    pub(crate) fn new(parser: T) -> Self {
        let size = parser.max_frame_size();
        Self {
            parser,
            buffer: ReadBuffer::new(size),
        }
    }

    /// discard buffered bytes and any partial parse state
    pub(crate) fn reset(&mut self) {
        self.parser.reset();
        self.buffer.clear();
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        adu: AduDecodeLevel,
        physical: PhysDecodeLevel,
    ) -> Result<Box<dyn Frame>, Error> {
        loop {
            if let Some(frame) = self.parser.parse(&mut self.buffer, adu)? {
                return Ok(frame);
            }

            let silence = match io.silence() {
                Some(silence) if self.parser.awaiting_silence() => silence,
                _ => {
                    self.buffer.read_some(io, physical).await?;
                    continue;
                }
            };

            let line_silent = tokio::select! {
                result = self.buffer.read_some(io, physical) => {
                    result?;
                    false
                }
                _ = tokio::time::sleep(silence) => true,
            };

            if line_silent {
                if let Some(frame) = self.parser.parse_on_silence(&mut self.buffer, adu)? {
                    return Ok(frame);
                }
            }
        }
    }
}
