//! Transports carrying JSON-RPC to the host.

pub mod framing;
pub mod stdio;

pub use stdio::StdioTransport;
