use scursor::ReadCursor;

use crate::constants::coil;
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::handlers::{bad_value, device, expect_empty};
use crate::server::store::RegisterStore;
use crate::types::Indexed;

/// Write single coil (0x05), the response echoes the request
pub fn write_single_coil(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let value = parse_request(request)?;
    let value = match value.value {
        coil::ON => Indexed::new(value.index, true),
        coil::OFF => Indexed::new(value.index, false),
        _ => return Err(ExceptionCode::IllegalDataValue),
    };

    device(store, request)?.coils_mut()[value.index as usize] = value.value;
    Ok(request.data().to_vec())
}

/// Write single register (0x06), the response echoes the request
pub fn write_single_register(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let value = parse_request(request)?;
    device(store, request)?.holding_registers_mut()[value.index as usize] = value.value;
    Ok(request.data().to_vec())
}

fn parse_request(request: &dyn Frame) -> Result<Indexed<u16>, ExceptionCode> {
    let mut cursor = ReadCursor::new(request.data());
    let index = cursor.read_u16_be().map_err(bad_value)?;
    let value = cursor.read_u16_be().map_err(bad_value)?;
    expect_empty(&cursor)?;
    Ok(Indexed::new(index, value))
}
