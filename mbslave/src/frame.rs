use crate::exception::ExceptionCode;
use crate::types::UnitId;

/// Bit set in the function code of a response that carries an exception
pub(crate) const EXCEPTION_BIT: u8 = 0x80;

/// A decoded protocol message, independent of the transport it arrived on
///
/// Transports decode bytes into a `Frame`, the dispatcher derives the response from it
/// with [`Frame::copy`], and the transport writes back whatever [`Frame::serialize`] returns.
/// [`TcpFrame`](crate::tcp::TcpFrame) and [`RtuFrame`](crate::serial::RtuFrame) are the two
/// provided implementations.
pub trait Frame: Send + std::fmt::Debug {
    /// New frame with the same header/addressing metadata and an empty payload
    fn copy(&self) -> Box<dyn Frame>;

    /// Function code of the frame
    fn function(&self) -> u8;

    /// Unit id the frame is addressed to
    fn unit_id(&self) -> UnitId;

    /// Data that follows the function code
    fn data(&self) -> &[u8];

    /// Replace the data that follows the function code
    fn set_data(&mut self, data: &[u8]);

    /// Turn the frame into an exception response
    ///
    /// The high bit of the function code is set and the exception code becomes the only data byte.
    fn set_exception(&mut self, exception: ExceptionCode);

    /// Bytes to write on the wire, including any header and checksum
    fn serialize(&self) -> Vec<u8>;
}

pub(crate) struct FrameDisplay<'a> {
    frame: &'a dyn Frame,
    data: bool,
}

impl<'a> FrameDisplay<'a> {
    pub(crate) fn new(frame: &'a dyn Frame, data: bool) -> Self {
        Self { frame, data }
    }
}

impl std::fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let function = self.frame.function();
        match crate::common::function::FunctionCode::get(function & !EXCEPTION_BIT) {
            Some(code) if function & EXCEPTION_BIT == 0 => write!(f, "unit: {} {}", self.frame.unit_id(), code)?,
            _ => write!(f, "unit: {} function: {:#04X}", self.frame.unit_id(), function)?,
        }
        if function & EXCEPTION_BIT != 0 {
            if let Some(ex) = self.frame.data().first() {
                write!(f, " exception: {:?}", ExceptionCode::from(*ex))?;
            }
        }
        if self.data {
            crate::common::phys::format_bytes(f, self.frame.data())?;
        }
        Ok(())
    }
}
