//! An async Modbus slave engine using [Tokio](https://docs.rs/tokio) and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * One dispatch task per server: requests from every connection are processed one at a time,
//!   in the order they were received, against a single register store
//! * Per-device function tables with the standard handlers installed by default
//! * Custom function codes through plain functions or closures
//! * Panic-free parsing, handler faults are answered with an exception
//! * Modbus TCP and Modbus RTU over serial (`serial` feature)
//!
//! # Supported Functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//! * Write Multiple Coils
//! * Write Multiple Registers
//!
//! # Example
//!
//! A TCP slave with a single device and a custom function code
//!
//! ```no_run
//! use std::net::SocketAddr;
//!
//! use mbslave::*;
//! use mbslave::server::*;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(&[UnitId::new(1)], ServerConfig::default());
//!
//!     // function code 0x41 returns the sum of the first two holding registers
//!     server
//!         .register_handler(
//!             UnitId::new(1),
//!             0x41,
//!             handler_fn(|store, request| {
//!                 let device = store
//!                     .get(request.unit_id())
//!                     .ok_or(ExceptionCode::ServerDeviceFailure)?;
//!                 let registers = device.holding_registers();
//!                 let sum = registers[0].wrapping_add(registers[1]);
//!                 Ok(sum.to_be_bytes().to_vec())
//!             }),
//!         )
//!         .await?;
//!
//!     server.listen_tcp(SocketAddr::from(([127, 0, 0, 1], 502))).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.close().await;
//!     Ok(())
//! }
//! ```

/// Modbus protocol constants
pub mod constants;
/// Error types
pub mod error;
/// Modbus TCP framing
pub mod tcp;
/// Modbus RTU framing and serial port settings
pub mod serial;
pub mod server;

mod common;
mod decode;
mod exception;
mod frame;
mod types;

// re-export to the public API
pub use crate::common::function::FunctionCode;
pub use crate::decode::*;
pub use crate::error::{ConfigError, Error, FrameParseError, InternalError};
pub use crate::exception::ExceptionCode;
pub use crate::frame::Frame;
pub use crate::types::*;
