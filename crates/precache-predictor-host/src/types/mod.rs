//! JSON-RPC types used by the host.

pub mod error;
pub mod message;

pub use error::*;
pub use message::*;
