use crate::types::UnitId;

/// Top level error type for the server and its transports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// An I/O error occurred on a transport
    Io(std::io::ErrorKind),
    /// A frame received on a transport could not be parsed
    BadFrame(FrameParseError),
    /// The server configuration rejected an operation
    Config(ConfigError),
    /// An internal error occurred while handling raw bytes
    Internal(InternalError),
    /// A store transaction panicked, the store keeps any writes made before the panic
    TransactionPanicked,
    /// The dispatch task has shut down and no longer accepts requests
    Shutdown,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(kind) => write!(f, "{}", std::io::Error::from(*kind)),
            Error::BadFrame(err) => write!(f, "bad frame: {err}"),
            Error::Config(err) => write!(f, "configuration error: {err}"),
            Error::Internal(err) => write!(f, "internal error: {err}"),
            Error::TransactionPanicked => f.write_str("store transaction panicked"),
            Error::Shutdown => f.write_str("the dispatch task has shut down"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.kind())
    }
}

impl From<FrameParseError> for Error {
    fn from(err: FrameParseError) -> Self {
        Error::BadFrame(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        Error::Internal(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Shutdown
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::Shutdown
    }
}

/// Errors raised while configuring the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Handler registration for a unit id that was not part of the initial configuration
    UnknownUnitId(UnitId),
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::UnknownUnitId(id) => {
                write!(f, "unable to register function for undefined unit id: {id}")
            }
        }
    }
}

/// Errors that occur while parsing a frame off a stream (TCP or serial)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received TCP frame with the length field set to zero
    MbapLengthZero,
    /// Received TCP frame with length that exceeds max allowed size
    MbapLengthTooBig(usize, usize), // actual size and the maximum size
    /// Received TCP frame with a non-Modbus protocol id
    UnknownProtocolId(u16),
    /// Received a frame that does not contain a complete header
    FrameTooShort(usize), // actual size
    /// Received a frame whose declared length does not match the number of bytes
    LengthMismatch(usize, usize), // declared / actual
    /// Received a serial frame whose length exceeds the maximum allowed size
    FrameLengthTooBig(usize, usize), // actual size and the maximum size
    /// Received a serial frame whose CRC does not match the computed value
    CrcValidationFailure(u16, u16), // received / expected
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("received TCP frame with the length field set to zero")
            }
            FrameParseError::MbapLengthTooBig(size, max) => write!(
                f,
                "received TCP frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received TCP frame with non-Modbus protocol id: {id}")
            }
            FrameParseError::FrameTooShort(size) => {
                write!(f, "received frame of {size} bytes which is too short to be valid")
            }
            FrameParseError::LengthMismatch(declared, actual) => write!(
                f,
                "frame declares a length of {declared} bytes but contains {actual}"
            ),
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "received serial frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "received CRC value {received:#06X} that doesn't match the expected value {expected:#06X}"
            ),
        }
    }
}

/// Errors that indicate faulty logic in the library itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// Attempted to read more bytes than present
    InsufficientBytesForRead(usize, usize), // requested / remaining
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_unit_in_hex() {
        let err = Error::from(ConfigError::UnknownUnitId(UnitId::new(0x2A)));
        assert_eq!(
            err.to_string(),
            "configuration error: unable to register function for undefined unit id: 0x2A"
        );
    }

    #[test]
    fn transaction_panic_is_not_reported_as_shutdown() {
        assert_ne!(
            Error::TransactionPanicked.to_string(),
            Error::Shutdown.to_string()
        );
    }
}
