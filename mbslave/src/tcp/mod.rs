pub(crate) mod frame;
pub(crate) mod server;

pub use frame::TcpFrame;
