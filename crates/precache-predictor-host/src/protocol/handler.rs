//! Routes JSON-RPC calls to the coordinator.
//!
//! The method name is the message `action`; params are merged into the
//! message object. Requests wait for the coordinator's reply, notifications
//! are delivered fire-and-forget.

use serde_json::{Map, Value};

use precache_predictor::{CoordinatorHandle, Message};

use crate::types::*;

use super::validator::{validate_envelope, validate_params};

/// Methods answered by the host itself.
const HOST_METHODS: &[&str] = &["ping", "listActions"];

pub struct ProtocolHandler {
    coordinator: CoordinatorHandle,
}

impl ProtocolHandler {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }

    /// Handle one message. Returns the response for requests, `None` for
    /// notifications.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                if let Err(e) = self.handle_notification(notif).await {
                    tracing::warn!("Dropped notification: {e}");
                }
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let result = match validate_envelope(&request.jsonrpc, &request.method) {
            Ok(()) => self.dispatch_request(request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
            Err(e) => serde_json::to_value(e.to_json_rpc_error(id)).unwrap_or_default(),
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> HostResult<Value> {
        match request.method.as_str() {
            "ping" => Ok(Value::Object(Map::new())),
            "listActions" => Ok(serde_json::json!({
                "actions": Message::ACTIONS,
                "hostMethods": HOST_METHODS,
            })),
            _ => {
                let message = to_message(&request.method, request.params)?;
                let reply = self.coordinator.request(message).await?;
                Ok(match reply {
                    Value::Null => Value::Object(Map::new()),
                    other => other,
                })
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) -> HostResult<()> {
        validate_envelope(&notification.jsonrpc, &notification.method)?;
        if HOST_METHODS.contains(&notification.method.as_str()) {
            return Ok(());
        }
        let message = to_message(&notification.method, notification.params)?;
        self.coordinator.send(message).await?;
        Ok(())
    }
}

/// Build a coordinator [`Message`] from a method name and its params.
pub fn to_message(method: &str, params: Option<Value>) -> HostResult<Message> {
    if !Message::ACTIONS.contains(&method) {
        return Err(HostError::MethodNotFound(method.to_string()));
    }
    validate_params(params.as_ref())?;

    let mut fields = match params {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    fields.insert("action".to_string(), Value::String(method.to_string()));

    serde_json::from_value(Value::Object(fields)).map_err(|e| HostError::InvalidParams(e.to_string()))
}
