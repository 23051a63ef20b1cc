//! Frame routing between client sessions and the broker.

pub mod forwarder;
pub mod inbound;


pub use forwarder::OutboundForwarder;
pub use inbound::{InboundReader, LOST_CONNECTION};
