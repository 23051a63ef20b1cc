//! STOMP frame model and codec.
//!
//! A frame on the wire is a command line, zero or more `name:value` header
//! lines, a blank line, the body and a single NUL terminator. There is no
//! length prefix; the NUL is the only frame boundary the relay relies on.

mod codec;
mod command;
mod headers;
mod wire;

pub use codec::StompCodec;
pub use command::StompCommand;
pub use headers::{StompHeaders, names};
pub use wire::{Frame, NUL};
