//! PreCache Predictor host: one coordinator behind JSON-RPC over stdio.

pub mod config;
pub mod protocol;
pub mod transport;
pub mod types;

pub use config::resolve_store_path;
pub use protocol::ProtocolHandler;
pub use transport::StdioTransport;
