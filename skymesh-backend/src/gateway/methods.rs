use crate::conversations::ConversationStore;
use crate::gateway::protocol::RpcError;
use serde_json::Value;

pub async fn handle_ping() -> Result<Value, RpcError> {
    Ok(serde_json::json!("pong"))
}

/// The Bluesky handle the bridge answers as
pub async fn handle_get_handle(handle: &str) -> Result<Value, RpcError> {
    Ok(serde_json::json!(handle))
}

pub async fn handle_get_history(conversations: &ConversationStore) -> Result<Value, RpcError> {
    serde_json::to_value(conversations.snapshot())
        .map_err(|e| RpcError::internal_error(format!("Failed to encode history: {}", e)))
}
