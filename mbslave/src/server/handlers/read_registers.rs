use scursor::ReadCursor;

use crate::constants::limits::MAX_READ_REGISTERS_COUNT;
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::handlers::{device, expect_empty, parse_range};
use crate::server::store::RegisterStore;
use crate::types::AddressRange;

/// Read holding registers (0x03)
pub fn read_holding_registers(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_request(request)?;
    let device = device(store, request)?;
    Ok(format_registers(
        &device.holding_registers()[range.to_std_range()],
    ))
}

/// Read input registers (0x04)
pub fn read_input_registers(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_request(request)?;
    let device = device(store, request)?;
    Ok(format_registers(
        &device.input_registers()[range.to_std_range()],
    ))
}

fn parse_request(request: &dyn Frame) -> Result<AddressRange, ExceptionCode> {
    let mut cursor = ReadCursor::new(request.data());
    let range = parse_range(&mut cursor, MAX_READ_REGISTERS_COUNT)?;
    expect_empty(&cursor)?;
    Ok(range)
}

// byte count followed by big-endian registers
fn format_registers(values: &[u16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 * values.len() + 1);
    data.push((2 * values.len()) as u8);
    for value in values {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data
}
