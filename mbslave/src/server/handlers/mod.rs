//! Standard handlers for the eight function codes installed on every device
//!
//! They are registered by default, but are public so that a custom handler can
//! delegate to them, e.g. to log or veto writes before applying them.

use scursor::ReadCursor;

use crate::common::function::FunctionCode;
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::store::{DeviceMemory, RegisterStore};
use crate::server::table::BoxedHandler;
use crate::types::AddressRange;

mod read_bits;
mod read_registers;
mod write_multiple;
mod write_single;

pub use read_bits::*;
pub use read_registers::*;
pub use write_multiple::*;
pub use write_single::*;

pub(crate) fn standard(code: FunctionCode) -> BoxedHandler {
    match code {
        FunctionCode::ReadCoils => Box::new(read_coils),
        FunctionCode::ReadDiscreteInputs => Box::new(read_discrete_inputs),
        FunctionCode::ReadHoldingRegisters => Box::new(read_holding_registers),
        FunctionCode::ReadInputRegisters => Box::new(read_input_registers),
        FunctionCode::WriteSingleCoil => Box::new(write_single_coil),
        FunctionCode::WriteSingleRegister => Box::new(write_single_register),
        FunctionCode::WriteMultipleCoils => Box::new(write_multiple_coils),
        FunctionCode::WriteMultipleRegisters => Box::new(write_multiple_registers),
    }
}

// truncated requests are reported the same way as bad values
fn bad_value<E>(_: E) -> ExceptionCode {
    ExceptionCode::IllegalDataValue
}

fn device<'a>(
    store: &'a mut RegisterStore,
    request: &dyn Frame,
) -> Result<&'a mut DeviceMemory, ExceptionCode> {
    store
        .get_mut(request.unit_id())
        .ok_or(ExceptionCode::ServerDeviceFailure)
}

// the quantity is validated before the address, as the protocol requires
fn parse_range(cursor: &mut ReadCursor, max_count: u16) -> Result<AddressRange, ExceptionCode> {
    let start = cursor.read_u16_be().map_err(bad_value)?;
    let count = cursor.read_u16_be().map_err(bad_value)?;

    if count == 0 || count > max_count {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let range = AddressRange::new(start, count);
    if !range.fits_table() {
        return Err(ExceptionCode::IllegalDataAddress);
    }

    Ok(range)
}

fn expect_empty(cursor: &ReadCursor) -> Result<(), ExceptionCode> {
    if cursor.is_empty() {
        Ok(())
    } else {
        Err(ExceptionCode::IllegalDataValue)
    }
}
