use serde::{Deserialize, Serialize};
use serde_json::Value;
use skymesh_types::{Conversation, HandleUpdate};

/// Dashboard event names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Full conversation list, sent once on connect
    History,
    HandleUpdate,
    NewQuestion,
    NewResponse,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::HandleUpdate => "handle_update",
            Self::NewQuestion => "new_question",
            Self::NewResponse => "new_response",
            Self::Error => "error",
        }
    }

    #[cfg(test)]
    pub fn from_str(s: &str) -> Option<EventType> {
        match s {
            "history" => Some(EventType::History),
            "handle_update" => Some(EventType::HandleUpdate),
            "new_question" => Some(EventType::NewQuestion),
            "new_response" => Some(EventType::NewResponse),
            "error" => Some(EventType::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// JSON-RPC request from a dashboard client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response to a dashboard client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: String, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }
}

/// Server-push event, `{"type":"event","event":...,"data":...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub event: String,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            type_: "event".to_string(),
            event: event.into(),
            data,
        }
    }

    pub fn history(conversations: &[Conversation]) -> Self {
        Self::new(EventType::History, to_value(conversations))
    }

    pub fn handle_update(handle: &str) -> Self {
        Self::new(
            EventType::HandleUpdate,
            to_value(&HandleUpdate {
                handle: handle.to_string(),
            }),
        )
    }

    /// A question was received and is being answered
    pub fn new_question(conversation: &Conversation) -> Self {
        Self::new(EventType::NewQuestion, to_value(conversation))
    }

    /// Agent Mesh answered; the reply thread is about to be posted
    pub fn new_response(conversation: &Conversation) -> Self {
        Self::new(EventType::NewResponse, to_value(conversation))
    }

    pub fn error(conversation: &Conversation) -> Self {
        Self::new(EventType::Error, to_value(conversation))
    }
}

fn to_value<T: Serialize + ?Sized>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}
