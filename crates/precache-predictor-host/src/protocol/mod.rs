//! JSON-RPC dispatch onto the coordinator.

pub mod handler;
pub mod validator;

pub use handler::ProtocolHandler;
