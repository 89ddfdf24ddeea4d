use scursor::ReadCursor;

use crate::common::bits::pack_bits;
use crate::constants::limits::MAX_READ_COILS_COUNT;
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::handlers::{device, expect_empty, parse_range};
use crate::server::store::RegisterStore;
use crate::types::AddressRange;

/// Read coils (0x01)
pub fn read_coils(store: &mut RegisterStore, request: &dyn Frame) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_request(request)?;
    let device = device(store, request)?;
    Ok(format_bits(&device.coils()[range.to_std_range()]))
}

/// Read discrete inputs (0x02)
pub fn read_discrete_inputs(
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_request(request)?;
    let device = device(store, request)?;
    Ok(format_bits(&device.discrete_inputs()[range.to_std_range()]))
}

fn parse_request(request: &dyn Frame) -> Result<AddressRange, ExceptionCode> {
    let mut cursor = ReadCursor::new(request.data());
    let range = parse_range(&mut cursor, MAX_READ_COILS_COUNT)?;
    expect_empty(&cursor)?;
    Ok(range)
}

// byte count followed by the packed bits
fn format_bits(values: &[bool]) -> Vec<u8> {
    let packed = pack_bits(values);
    let mut data = Vec::with_capacity(packed.len() + 1);
    data.push(packed.len() as u8);
    data.extend_from_slice(&packed);
    data
}
