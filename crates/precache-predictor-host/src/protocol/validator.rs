//! JSON-RPC envelope validation.

use serde_json::Value;

use crate::types::{HostError, HostResult, JSONRPC_VERSION};

/// Check the protocol version and method name of any incoming message.
pub fn validate_envelope(jsonrpc: &str, method: &str) -> HostResult<()> {
    if jsonrpc != JSONRPC_VERSION {
        return Err(HostError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{jsonrpc}\""
        )));
    }

    if method.is_empty() {
        return Err(HostError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Params must be absent, `null` or an object; action fields are named.
pub fn validate_params(params: Option<&Value>) -> HostResult<()> {
    match params {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(HostError::InvalidParams(format!(
            "params must be an object, got {}",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
