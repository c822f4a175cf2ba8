//! Host errors and their JSON-RPC error codes.

use precache_predictor::PredictorError;

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// The coordinator task has stopped.
    pub const COORDINATOR_UNAVAILABLE: i32 = -32850;
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Coordinator unavailable")]
    CoordinatorUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        match self {
            HostError::ParseError(_) | HostError::Json(_) => PARSE_ERROR,
            HostError::InvalidRequest(_) => INVALID_REQUEST,
            HostError::MethodNotFound(_) => METHOD_NOT_FOUND,
            HostError::InvalidParams(_) => INVALID_PARAMS,
            HostError::InternalError(_) | HostError::Io(_) => INTERNAL_ERROR,
            HostError::CoordinatorUnavailable => COORDINATOR_UNAVAILABLE,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }
}

impl From<PredictorError> for HostError {
    fn from(e: PredictorError) -> Self {
        match e {
            PredictorError::ChannelClosed => HostError::CoordinatorUnavailable,
            PredictorError::InvalidInput(msg) => HostError::InvalidParams(msg),
            other => HostError::InternalError(other.to_string()),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;
