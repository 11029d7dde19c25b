//! TCP+msgpack IPC transport layer.
//!
//! Exposes the relay's control boundary to out-of-process consumers using
//! length-prefixed msgpack framing. Operations are addressed by control code
//! or method name (see [`router::ControlCode`]).

pub mod codec;
pub mod handlers;
pub mod router;
pub mod server;

pub use router::ControlCode;
pub use server::IpcServer;
