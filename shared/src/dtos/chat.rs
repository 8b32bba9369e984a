use serde::{Deserialize, Serialize};

/// Client-to-server chat frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientChatMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// Server-to-client chat frame relayed from the agent runtime.
///
/// `kind` is one of `token`, `tool_call`, `final`, `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerChatFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: serde_json::Value,
}
