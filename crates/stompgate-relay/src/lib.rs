//! StompGate Relay Library
//!
//! Bridges client sessions on a local message bus to a STOMP broker:
//! - One broker TCP connection per client session
//! - Session registry as the single source of truth for live sessions
//! - Outbound forwarding of client commands as STOMP frames
//! - One inbound reader task per session republishing broker frames
//! - Newline-delimited JSON stdio adapter for the relay binary

pub mod bus;
pub mod controller;
pub mod error;
pub mod registry;
pub mod router;
pub mod stdio;

pub use bus::{ClientEvent, ClientSink};
pub use controller::RelayController;
pub use error::RelayError;
pub use registry::{RelaySession, SessionRegistry};
