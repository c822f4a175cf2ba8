//! Newline-delimited JSON framing.

use crate::types::{HostError, HostResult, JsonRpcMessage};

/// Parse one line as a JSON-RPC message.
pub fn parse_message(line: &str) -> HostResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(HostError::ParseError("Empty message".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| HostError::ParseError(e.to_string()))?;
    if !value.is_object() {
        return Err(HostError::InvalidRequest("Message must be a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| HostError::InvalidRequest(e.to_string()))
}

/// Serialize a value as one line, newline included.
pub fn frame_message(value: &serde_json::Value) -> HostResult<String> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    Ok(json)
}
