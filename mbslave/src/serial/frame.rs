use crate::error::FrameParseError;
use crate::exception::ExceptionCode;
use crate::frame::{Frame, EXCEPTION_BIT};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    pub(crate) const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + FUNCTION_CODE_LENGTH + CRC_LENGTH;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::constants::limits::MAX_PDU_LENGTH + CRC_LENGTH;
}

/// precomputes the CRC table as a constant!
const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// A Modbus RTU frame: address, PDU and a CRC-16 sent little-endian
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RtuFrame {
    /// Unit identifier (slave address), 0 is broadcast
    pub unit_id: UnitId,
    /// Function code
    pub function: u8,
    /// Data that follows the function code
    pub data: Vec<u8>,
}

impl RtuFrame {
    /// Create a frame, the CRC is computed on serialization
    pub fn new(unit_id: UnitId, function: u8, data: &[u8]) -> Self {
        Self {
            unit_id,
            function,
            data: data.to_vec(),
        }
    }

    /// Parse one complete RTU frame and validate its CRC
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameParseError> {
        if bytes.len() < constants::MIN_FRAME_LENGTH {
            return Err(FrameParseError::FrameTooShort(bytes.len()));
        }
        if bytes.len() > constants::MAX_FRAME_LENGTH {
            return Err(FrameParseError::FrameLengthTooBig(
                bytes.len(),
                constants::MAX_FRAME_LENGTH,
            ));
        }

        let (body, crc) = bytes.split_at(bytes.len() - constants::CRC_LENGTH);
        let received = u16::from_le_bytes([crc[0], crc[1]]);
        let expected = CRC.checksum(body);
        if received != expected {
            return Err(FrameParseError::CrcValidationFailure(received, expected));
        }

        Ok(Self::new(UnitId::new(body[0]), body[1], &body[2..]))
    }

    pub(crate) fn crc(&self) -> u16 {
        let mut digest = CRC.digest();
        digest.update(&[self.unit_id.value, self.function]);
        digest.update(&self.data);
        digest.finalize()
    }
}

impl Frame for RtuFrame {
    fn copy(&self) -> Box<dyn Frame> {
        Box::new(Self {
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
        let mut bytes = Vec::with_capacity(constants::MIN_FRAME_LENGTH + self.data.len());
        bytes.push(self.unit_id.value);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(&self.crc().to_le_bytes());
        bytes
    }
}
