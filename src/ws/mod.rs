//! WebSocket transport: wire protocol, command admission and sessions

pub mod gatekeeper;
pub mod handler;
pub mod protocol;
pub mod session;

pub use handler::ws_handler;
