/// Controls the decoding of transmitted and received data at the application, frame, and physical layer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodeLevel {
    /// Controls the protocol data unit decoding
    pub pdu: PduDecodeLevel,
    /// Controls the application data unit decoding
    ///
    /// On TCP, this is the MBAP decoding. On serial, this controls
    /// the serial line PDU.
    pub adu: AduDecodeLevel,
    /// Controls the logging of physical layer read/write
    pub physical: PhysDecodeLevel,
}

/// Controls how the Protocol Data Units (PDUs) seen by the dispatch task are decoded at the INFO log level
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PduDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the unit id and function code only
    FunctionCode,
    /// Decode the function code and the data bytes
    Data,
}

/// Controls how the transmitted and received Application Data Units (ADUs) are decoded at the INFO log level
///
/// On TCP, this is the MBAP decoding. On serial, this controls the serial line PDU.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum AduDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the header
    Header,
    /// Decode the header and the raw payload as hexadecimal
    Payload,
}

/// Controls how data transmitted at the physical layer (TCP, serial, etc) is logged
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PhysDecodeLevel {
    /// Log nothing
    #[default]
    Nothing,
    /// Log only the length of data that is sent and received
    Length,
    /// Log the length and the actual data that is sent and received
    Data,
}

impl DecodeLevel {
    /// construct a `DecodeLevel` with nothing enabled
    pub fn nothing() -> Self {
        Self::default()
    }

    /// construct a `DecodeLevel` from its fields
    pub fn new(pdu: PduDecodeLevel, adu: AduDecodeLevel, physical: PhysDecodeLevel) -> Self {
        DecodeLevel { pdu, adu, physical }
    }
}

impl From<PduDecodeLevel> for DecodeLevel {
    fn from(pdu: PduDecodeLevel) -> Self {
        Self {
            pdu,
            adu: AduDecodeLevel::Nothing,
            physical: PhysDecodeLevel::Nothing,
        }
    }
}

impl PduDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        match self {
            PduDecodeLevel::Nothing => false,
            PduDecodeLevel::FunctionCode => true,
            PduDecodeLevel::Data => true,
        }
    }

    pub(crate) fn data_enabled(&self) -> bool {
        match self {
            PduDecodeLevel::Nothing => false,
            PduDecodeLevel::FunctionCode => false,
            PduDecodeLevel::Data => true,
        }
    }
}

impl AduDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        match self {
            AduDecodeLevel::Nothing => false,
            AduDecodeLevel::Header => true,
            AduDecodeLevel::Payload => true,
        }
    }

    pub(crate) fn payload_enabled(&self) -> bool {
        match self {
            AduDecodeLevel::Nothing => false,
            AduDecodeLevel::Header => false,
            AduDecodeLevel::Payload => true,
        }
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        match self {
            PhysDecodeLevel::Nothing => false,
            PhysDecodeLevel::Length => true,
            PhysDecodeLevel::Data => true,
        }
    }

    pub(crate) fn data_enabled(&self) -> bool {
        match self {
            PhysDecodeLevel::Nothing => false,
            PhysDecodeLevel::Length => false,
            PhysDecodeLevel::Data => true,
        }
    }
}
