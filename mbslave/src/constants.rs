/// Values used when writing a single coil
pub mod coil {
    /// u16 representation of COIL == ON when performing write single coil
    pub const ON: u16 = 0xFF00;
    /// u16 representation of COIL == OFF when performing write single coil
    pub const OFF: u16 = 0x0000;
}

/// Limits on the number of values in a single request
pub mod limits {
    /// Maximum count allowed in a read coils/discrete inputs request
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding/input registers request
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Maximum count allowed in a `write multiple coils` request
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Maximum count allowed in a `write multiple registers` request
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
    /// Number of addressable values in each of the four tables of a device
    pub const TABLE_SIZE: usize = 65536;
    /// Maximum length of a PDU (function code + data)
    pub const MAX_PDU_LENGTH: usize = 253;
    /// Maximum length of the data that follows the function code in a PDU
    pub const MAX_PDU_DATA_LENGTH: usize = MAX_PDU_LENGTH - 1;
}

/// Raw values of the exception codes defined in the Modbus specification
pub mod exceptions {
    /// Illegal function
    pub const ILLEGAL_FUNCTION: u8 = 0x01;
    /// Illegal data address
    pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    /// Illegal data value
    pub const ILLEGAL_DATA_VALUE: u8 = 0x03;
    /// Server device failure
    pub const SERVER_DEVICE_FAILURE: u8 = 0x04;
    /// Acknowledge
    pub const ACKNOWLEDGE: u8 = 0x05;
    /// Server device busy
    pub const SERVER_DEVICE_BUSY: u8 = 0x06;
    /// Memory parity error
    pub const MEMORY_PARITY_ERROR: u8 = 0x08;
    /// Gateway path unavailable
    pub const GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
    /// Gateway target device failed to respond
    pub const GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: u8 = 0x0B;
}
