//! `StompGate` Core Library
//!
//! Shared functionality for `StompGate` components:
//! - STOMP frame model and NUL-delimited wire codec
//! - Addressed relay messages and payload conversion
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod message;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{Frame, StompCodec, StompCommand, StompHeaders};
pub use message::{Payload, RelayMessage};
