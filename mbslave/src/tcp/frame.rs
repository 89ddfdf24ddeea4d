use scursor::ReadCursor;

use crate::common::buffer::ReadBuffer;
use crate::common::reader::FrameParser;
use crate::decode::AduDecodeLevel;
use crate::error::{Error, FrameParseError};
use crate::exception::ExceptionCode;
use crate::frame::{Frame, EXCEPTION_BIT};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::constants::limits::MAX_PDU_LENGTH;
    // includes the 1 byte unit id
    pub(crate) const MAX_LENGTH_FIELD: usize = crate::constants::limits::MAX_PDU_LENGTH + 1;
}

/// A Modbus TCP frame: MBAP header followed by the PDU
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpFrame {
    /// Transaction identifier, echoed in the response
    pub tx_id: u16,
    /// Protocol identifier, always zero for Modbus
    pub protocol_id: u16,
    /// Unit identifier
    pub unit_id: UnitId,
    /// Function code
    pub function: u8,
    /// Data that follows the function code
    pub data: Vec<u8>,
}

impl TcpFrame {
    /// Create a frame with protocol id 0
    pub fn new(tx_id: u16, unit_id: UnitId, function: u8, data: &[u8]) -> Self {
        Self {
            tx_id,
            protocol_id: 0,
            unit_id,
            function,
            data: data.to_vec(),
        }
    }

    /// Parse one complete MBAP frame
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameParseError> {
        let too_short = |_| FrameParseError::FrameTooShort(bytes.len());
        let mut cursor = ReadCursor::new(bytes);

        let tx_id = cursor.read_u16_be().map_err(too_short)?;
        let protocol_id = cursor.read_u16_be().map_err(too_short)?;
        let length = cursor.read_u16_be().map_err(too_short)? as usize;
        let unit_id = UnitId::new(cursor.read_u8().map_err(too_short)?);
        let adu_length = validate_header(protocol_id, length)?;

        // the length field counts the unit id which is already part of the header
        let actual = bytes.len() - constants::HEADER_LENGTH;
        if adu_length != actual {
            return Err(FrameParseError::LengthMismatch(adu_length, actual));
        }

        let function = cursor.read_u8().map_err(too_short)?;
        let data = cursor.read_bytes(actual - 1).map_err(too_short)?;

        Ok(Self {
            tx_id,
            protocol_id,
            unit_id,
            function,
            data: data.to_vec(),
        })
    }
}

// returns the number of bytes that follow the header
fn validate_header(protocol_id: u16, length: usize) -> Result<usize, FrameParseError> {
    if protocol_id != 0 {
        return Err(FrameParseError::UnknownProtocolId(protocol_id));
    }

    if length > constants::MAX_LENGTH_FIELD {
        return Err(FrameParseError::MbapLengthTooBig(
            length,
            constants::MAX_LENGTH_FIELD,
        ));
    }

    // must be > 0 b/c the 1-byte unit identifier counts towards length
    if length == 0 {
        return Err(FrameParseError::MbapLengthZero);
    }

    // a frame without a function code can't be dispatched
    if length == 1 {
        return Err(FrameParseError::FrameTooShort(constants::HEADER_LENGTH));
    }

    Ok(length - 1)
}

impl Frame for TcpFrame {
    fn copy(&self) -> Box<dyn Frame> {
        Box::new(Self {
            tx_id: self.tx_id,
            protocol_id: self.protocol_id,
            unit_id: self.unit_id,
            function: self.function,
            data: Vec::new(),
        })
    }

    fn function(&self) -> u8 {
        self.function
    }

    fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn set_data(&mut self, data: &[u8]) {
        self.data = data.to_vec();
    }

    fn set_exception(&mut self, exception: ExceptionCode) {
        self.function |= EXCEPTION_BIT;
        self.data = vec![exception.into()];
    }

    fn serialize(&self) -> Vec<u8> {
        // unit id + function code + data
        let length = (2 + self.data.len()) as u16;
        let mut bytes = Vec::with_capacity(constants::HEADER_LENGTH + 1 + self.data.len());
        bytes.extend_from_slice(&self.tx_id.to_be_bytes());
        bytes.extend_from_slice(&self.protocol_id.to_be_bytes());
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(self.unit_id.value);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

#[derive(Clone, Copy)]
struct MbapHeader {
    tx_id: u16,
    adu_length: usize,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    Header(MbapHeader),
}

pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
        }
    }

    fn parse_header(cursor: &mut ReadBuffer) -> Result<MbapHeader, Error> {
        let tx_id = cursor.read_u16_be()?;
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;
        let unit_id = UnitId::new(cursor.read_u8()?);

        let adu_length = validate_header(protocol_id, length)?;

        Ok(MbapHeader {
            tx_id,
            adu_length,
            unit_id,
        })
    }

    fn parse_body(
        header: &MbapHeader,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<TcpFrame, Error> {
        let body = cursor.read(header.adu_length)?;
        let frame = TcpFrame {
            tx_id: header.tx_id,
            protocol_id: 0,
            unit_id: header.unit_id,
            function: body[0],
            data: body[1..].to_vec(),
        };

        if level.enabled() {
            tracing::info!("MBAP RX - {}", MbapDisplay::new(level, header, body));
        }

        Ok(frame)
    }
}

impl FrameParser for MbapParser {
    const NAME: &'static str = "MBAP";

    fn max_frame_size(&self) -> usize {
        constants::MAX_FRAME_LENGTH
    }

    fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        level: AduDecodeLevel,
    ) -> Result<Option<Box<dyn Frame>>, Error> {
        match self.state {
            ParseState::Header(header) => {
                if cursor.len() < header.adu_length {
                    return Ok(None);
                }

                let ret = Self::parse_body(&header, cursor, level)?;
                self.state = ParseState::Begin;
                Ok(Some(Box::new(ret)))
            }
            ParseState::Begin => {
                if cursor.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                self.state = ParseState::Header(Self::parse_header(cursor)?);
                self.parse(cursor, level)
            }
        }
    }

    fn reset(&mut self) {
        self.state = ParseState::Begin;
    }
}

struct MbapDisplay<'a> {
    level: AduDecodeLevel,
    header: &'a MbapHeader,
    bytes: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    fn new(level: AduDecodeLevel, header: &'a MbapHeader, bytes: &'a [u8]) -> Self {
        MbapDisplay {
            level,
            header,
            bytes,
        }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {:#06X} unit: {} len: {}",
            self.header.tx_id,
            self.header.unit_id,
            self.bytes.len()
        )?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.bytes)?;
        }
        Ok(())
    }
}
