//! Transport sub-processors the switcher hands classified sockets to.

pub mod tcp;
pub mod ws;

pub use tcp::TcpProcessor;
pub use ws::WsProcessor;
