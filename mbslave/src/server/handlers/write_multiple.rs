use scursor::ReadCursor;

use crate::common::bits::{num_bytes_for_bits, unpack_bits};
use crate::constants::limits::{MAX_WRITE_COILS_COUNT, MAX_WRITE_REGISTERS_COUNT};
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::handlers::{bad_value, device, expect_empty, parse_range};
use crate::server::store::RegisterStore;
use crate::types::AddressRange;

/// Write multiple coils (0x0F), the response contains the start address and quantity
pub fn write_multiple_coils(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let mut cursor = ReadCursor::new(request.data());
    let range = parse_range(&mut cursor, MAX_WRITE_COILS_COUNT)?;
    let bytes = read_values(&mut cursor, num_bytes_for_bits(range.count))?;
    let values = unpack_bits(bytes, range.count).ok_or(ExceptionCode::IllegalDataValue)?;

    device(store, request)?.coils_mut()[range.to_std_range()].copy_from_slice(&values);
    Ok(format_response(range))
}

/// Write multiple registers (0x10), the response contains the start address and quantity
pub fn write_multiple_registers(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let mut cursor = ReadCursor::new(request.data());
    let range = parse_range(&mut cursor, MAX_WRITE_REGISTERS_COUNT)?;
    let bytes = read_values(&mut cursor, 2 * range.count as usize)?;
    let values: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|x| u16::from_be_bytes([x[0], x[1]]))
        .collect();

    device(store, request)?.holding_registers_mut()[range.to_std_range()]
        .copy_from_slice(&values);
    Ok(format_response(range))
}

// the byte count must match the quantity, and nothing may follow the values
fn read_values<'a>(
    cursor: &mut ReadCursor<'a>,
    expected: usize,
) -> Result<&'a [u8], ExceptionCode> {
    let byte_count = cursor.read_u8().map_err(bad_value)? as usize;
    if byte_count != expected {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let bytes = cursor.read_bytes(byte_count).map_err(bad_value)?;
    expect_empty(cursor)?;
    Ok(bytes)
}

fn format_response(range: AddressRange) -> Vec<u8> {
    let mut data = Vec::with_capacity(4);
    data.extend_from_slice(&range.start.to_be_bytes());
    data.extend_from_slice(&range.count.to_be_bytes());
    data
}
