use crate::common::buffer::ReadBuffer;
use crate::common::function::FunctionCode;
use crate::common::reader::FrameParser;
use crate::decode::AduDecodeLevel;
use crate::error::{Error, FrameParseError};
use crate::frame::Frame;
use crate::serial::frame::{constants, RtuFrame};
use crate::types::UnitId;

#[derive(Clone, Copy)]
enum ParseState {
    Start,
    ReadFullBody(UnitId, usize),           // unit_id, length of rest
    ReadToOffsetForLength(UnitId, usize), // unit_id, length to length
    UntilSilence,
}

#[derive(Clone, Copy)]
enum LengthMode {
    /// The length is always the same (without function code)
    Fixed(usize),
    /// You need to read X more bytes. The last byte contains the number of extra bytes to read after that
    Offset(usize),
    /// Unknown function code, the frame ends when the line goes silent
    Unknown,
}

/// Frames requests on a serial line
///
/// The length of a standard request is derived from its function code. Requests with any other
/// function code carry no length information: they end when the line stays silent for the
/// inter-frame delay, or when the maximum frame size is reached.
pub(crate) struct RtuParser {
    state: ParseState,
}

impl RtuParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Start,
        }
    }

    fn length_mode(function_code: u8) -> LengthMode {
        match FunctionCode::get(function_code) {
            Some(FunctionCode::ReadCoils)
            | Some(FunctionCode::ReadDiscreteInputs)
            | Some(FunctionCode::ReadHoldingRegisters)
            | Some(FunctionCode::ReadInputRegisters)
            | Some(FunctionCode::WriteSingleCoil)
            | Some(FunctionCode::WriteSingleRegister) => LengthMode::Fixed(4),
            Some(FunctionCode::WriteMultipleCoils)
            | Some(FunctionCode::WriteMultipleRegisters) => LengthMode::Offset(5),
            None => LengthMode::Unknown,
        }
    }

    fn read_unit_id(cursor: &mut ReadBuffer) -> Result<UnitId, Error> {
        let unit_id = UnitId::new(cursor.read_u8()?);
        if unit_id.is_rtu_reserved() {
            tracing::warn!(
                "received reserved unit ID {}, passing it through nevertheless",
                unit_id
            );
        }
        Ok(unit_id)
    }

    fn parse_body(
        unit_id: UnitId,
        length: usize,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<RtuFrame, Error> {
        let frame = {
            let body = cursor.read(constants::FUNCTION_CODE_LENGTH + length)?;
            RtuFrame::new(unit_id, body[0], &body[1..])
        };
        let received_crc = cursor.read_u16_le()?;
        let expected_crc = frame.crc();

        if received_crc != expected_crc {
            return Err(Error::BadFrame(FrameParseError::CrcValidationFailure(
                received_crc,
                expected_crc,
            )));
        }

        if level.enabled() {
            tracing::info!("RTU RX - {}", RtuDisplay::new(level, &frame, received_crc));
        }

        Ok(frame)
    }

    /// everything buffered (up to the maximum frame size) is one frame
    fn frame_buffered(
        &mut self,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error> {
        self.state = ParseState::Start;

        let total = cursor.len().min(constants::MAX_FRAME_LENGTH);
        if total < constants::MIN_FRAME_LENGTH {
            cursor.read(total)?;
            return Err(Error::BadFrame(FrameParseError::FrameTooShort(total)));
        }

        let unit_id = Self::read_unit_id(cursor)?;
        let frame = Self::parse_body(unit_id, total - constants::MIN_FRAME_LENGTH, cursor, level)?;
        Ok(Some(Box::new(frame)))
    }
}

impl FrameParser for RtuParser {
    const NAME: &'static str = "RTU";

    fn max_frame_size(&self) -> usize {
        constants::MAX_FRAME_LENGTH
    }

    fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error> {
        match self.state {
            ParseState::Start => {
                if cursor.len() < constants::HEADER_LENGTH + constants::FUNCTION_CODE_LENGTH {
                    return Ok(None);
                }

                // We don't consume the function code to avoid an unecessary copy of the receive buffer later on
                let raw_function_code = cursor.peek_at(constants::HEADER_LENGTH)?;

                self.state = match Self::length_mode(raw_function_code) {
                    LengthMode::Fixed(length) => {
                        ParseState::ReadFullBody(Self::read_unit_id(cursor)?, length)
                    }
                    LengthMode::Offset(offset) => {
                        ParseState::ReadToOffsetForLength(Self::read_unit_id(cursor)?, offset)
                    }
                    LengthMode::Unknown => ParseState::UntilSilence,
                };

                self.parse(cursor, level)
            }
            ParseState::ReadToOffsetForLength(unit_id, offset) => {
                if cursor.len() < constants::FUNCTION_CODE_LENGTH + offset {
                    return Ok(None);
                }

                // Get the complete size
                let extra_bytes_to_read =
                    cursor.peek_at(constants::FUNCTION_CODE_LENGTH + offset - 1)? as usize;
                self.state = ParseState::ReadFullBody(unit_id, offset + extra_bytes_to_read);

                self.parse(cursor, level)
            }
            ParseState::ReadFullBody(unit_id, length) => {
                let pdu_length = constants::FUNCTION_CODE_LENGTH + length;
                if pdu_length > crate::constants::limits::MAX_PDU_LENGTH {
                    return Err(Error::BadFrame(FrameParseError::FrameLengthTooBig(
                        pdu_length,
                        crate::constants::limits::MAX_PDU_LENGTH,
                    )));
                }

                if cursor.len() < pdu_length + constants::CRC_LENGTH {
                    return Ok(None);
                }

                let frame = Self::parse_body(unit_id, length, cursor, level)?;
                self.state = ParseState::Start;
                Ok(Some(Box::new(frame)))
            }
            ParseState::UntilSilence => {
                // a full buffer cannot grow any further, so the frame must be complete
                if cursor.len() < constants::MAX_FRAME_LENGTH {
                    return Ok(None);
                }
                self.frame_buffered(cursor, level)
            }
        }
    }

    fn reset(&mut self) {
        self.state = ParseState::Start;
    }

    fn awaiting_silence(&self) -> bool {
        matches!(self.state, ParseState::UntilSilence)
    }

    fn parse_on_silence(
        &mut self,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error> {
        match self.state {
            ParseState::UntilSilence => self.frame_buffered(cursor, level),
            _ => Ok(None),
        }
    }
}

struct RtuDisplay<'a> {
    level: AduDecodeLevel,
    frame: &'a RtuFrame,
    crc: u16,
}

impl<'a> RtuDisplay<'a> {
    fn new(level: AduDecodeLevel, frame: &'a RtuFrame, crc: u16) -> Self {
        RtuDisplay { level, frame, crc }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "unit: {} crc: {:#06X} (payload len = {})",
            self.frame.unit_id,
            self.crc,
            self.frame.data.len() + 1,
        )?;
        if self.level.payload_enabled() {
            let mut payload = Vec::with_capacity(self.frame.data.len() + 1);
            payload.push(self.frame.function);
            payload.extend_from_slice(&self.frame.data);
            crate::common::phys::format_bytes(f, &payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration;
    use tokio_test::io::Builder;
    use tokio_test::{block_on, task};

    use crate::common::phys::PhysLayer;
    use crate::common::reader::FramedReader;
    use crate::decode::PhysDecodeLevel;
    use crate::serial::frame::tests::*;

    use super::*;

    const SILENCE: Duration = Duration::from_millis(2);

    fn read_frame(bytes: &[u8]) -> Result<Box<dyn Frame>, Error> {
        let mut io = PhysLayer::new_mock(Builder::new().read(bytes).build());
        let mut reader = FramedReader::new(RtuParser::new());
        block_on(reader.next_frame(&mut io, AduDecodeLevel::Nothing, PhysDecodeLevel::Nothing))
    }

    /// reads from a serial-like line; the line goes quiet after the given chunks
    async fn read_frame_on_line(chunks: &[&[u8]]) -> Result<Box<dyn Frame>, Error> {
        let mut builder = Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        builder.wait(Duration::from_secs(1));

        let mut io = PhysLayer::new_mock_serial(builder.build(), SILENCE);
        let mut reader = FramedReader::new(RtuParser::new());
        reader
            .next_frame(&mut io, AduDecodeLevel::Nothing, PhysDecodeLevel::Nothing)
            .await
    }

    #[test]
    fn can_parse_request_frames() {
        for request in ALL_REQUESTS {
            let frame = read_frame(request).unwrap();
            assert_frame_contents(frame.as_ref(), request);
        }
    }

    #[test]
    fn can_parse_request_frames_byte_per_byte() {
        for request in ALL_REQUESTS {
            let (io, mut handle) = Builder::new().build_with_handle();
            let mut phys = PhysLayer::new_mock(io);
            let mut reader = FramedReader::new(RtuParser::new());
            let mut task = task::spawn(reader.next_frame(
                &mut phys,
                AduDecodeLevel::Nothing,
                PhysDecodeLevel::Nothing,
            ));

            for byte in request.iter().take(request.len() - 1) {
                handle.read(&[*byte]);
                assert!(task.poll().is_pending());
            }

            handle.read(&[request[request.len() - 1]]);
            match task.poll() {
                std::task::Poll::Ready(frame) => {
                    assert_frame_contents(frame.unwrap().as_ref(), request)
                }
                std::task::Poll::Pending => panic!("task not ready"),
            }
        }
    }

    #[test]
    fn can_parse_two_frames_in_one_read() {
        let mut both = READ_COILS_REQUEST.to_vec();
        both.extend_from_slice(WRITE_MULTIPLE_REGISTERS_REQUEST);

        let mut io = PhysLayer::new_mock(Builder::new().read(&both).build());
        let mut reader = FramedReader::new(RtuParser::new());

        let first = block_on(reader.next_frame(
            &mut io,
            AduDecodeLevel::Nothing,
            PhysDecodeLevel::Nothing,
        ))
        .unwrap();
        assert_frame_contents(first.as_ref(), READ_COILS_REQUEST);

        let second = block_on(reader.next_frame(
            &mut io,
            AduDecodeLevel::Nothing,
            PhysDecodeLevel::Nothing,
        ))
        .unwrap();
        assert_frame_contents(second.as_ref(), WRITE_MULTIPLE_REGISTERS_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_function_ends_when_the_line_goes_silent() {
        let request = with_crc(&[UNIT_ID, 0x41, 0x01, 0x02, 0x03]);
        let frame = read_frame_on_line(&[&request]).await.unwrap();
        assert_eq!(frame.unit_id(), UnitId::new(UNIT_ID));
        assert_eq!(frame.function(), 0x41);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x03]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_function_split_across_reads() {
        let request = with_crc(&[0x01, 0x41, 0x01, 0x02, 0x03, 0x04]);
        let frame = read_frame_on_line(&[&request[..5], &request[5..]])
            .await
            .unwrap();
        assert_eq!(frame.function(), 0x41);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_function_split_byte_per_byte() {
        let request = with_crc(&[0x01, 0x41, 0xAA, 0xBB]);
        let chunks: Vec<&[u8]> = request.chunks(1).collect();
        let frame = read_frame_on_line(&chunks).await.unwrap();
        assert_eq!(frame.data(), &[0xAA, 0xBB]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_function_shorter_than_a_frame_is_rejected() {
        assert_eq!(
            read_frame_on_line(&[&[0x01, 0x41, 0x00]]).await.unwrap_err(),
            Error::BadFrame(FrameParseError::FrameTooShort(3))
        );
    }

    #[test]
    fn unknown_function_is_framed_once_the_buffer_is_full() {
        let mut body = vec![0x01, 0x41];
        body.resize(constants::MAX_FRAME_LENGTH - constants::CRC_LENGTH, 0x55);
        let frame = read_frame(&with_crc(&body)).unwrap();
        assert_eq!(frame.data().len(), crate::constants::limits::MAX_PDU_DATA_LENGTH);
    }

    #[test]
    fn errors_on_bad_crc() {
        let mut request = WRITE_SINGLE_COIL_REQUEST.to_vec();
        request[6] = 0x00;
        assert_eq!(
            read_frame(&request).unwrap_err(),
            Error::BadFrame(FrameParseError::CrcValidationFailure(0xE400, 0xE48B))
        );
    }

    #[test]
    fn errors_when_byte_count_exceeds_maximum_pdu() {
        let request = [UNIT_ID, 0x10, 0x00, 0x00, 0x00, 0x7C, 0xF8];
        assert_eq!(
            read_frame(&request).unwrap_err(),
            Error::BadFrame(FrameParseError::FrameLengthTooBig(254, 253))
        );
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut io = PhysLayer::new_mock(Builder::new().read(&READ_COILS_REQUEST[0..4]).build());
        let mut reader = FramedReader::new(RtuParser::new());
        assert!(block_on(reader.next_frame(
            &mut io,
            AduDecodeLevel::Nothing,
            PhysDecodeLevel::Nothing
        ))
        .is_err());

        reader.reset();
        let mut io = PhysLayer::new_mock(Builder::new().read(READ_COILS_REQUEST).build());
        let frame = block_on(reader.next_frame(
            &mut io,
            AduDecodeLevel::Nothing,
            PhysDecodeLevel::Nothing,
        ))
        .unwrap();
        assert_frame_contents(frame.as_ref(), READ_COILS_REQUEST);
    }
}
