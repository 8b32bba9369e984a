//! Client for the external agent runtime backing the chat WebSocket.
//!
//! The runtime surfaces the same service operations as conversational
//! tools; this backend only forwards the prompt with the caller's
//! identity and relays the frames it gets back. The principal travels as
//! explicit fields on every invocation, never ambiently.

use log::debug;
use serde::Deserialize;

use shared::dtos::chat::ServerChatFrame;

use crate::configuration::AgentSettings;
use crate::errors::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    frames: Vec<ServerChatFrame>,
}

pub struct AgentClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AgentClient {
    pub fn new(settings: &AgentSettings) -> Self {
        AgentClient {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Forwards one user prompt to the role's agent and returns the frames
    /// to relay (`token`, `tool_call`, `final`, `error`).
    pub async fn run_prompt(
        &self,
        role: &str,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> ApiResult<Vec<ServerChatFrame>> {
        let url = format!("{}/agents/{}/invoke", self.endpoint, role);
        debug!("Forwarding prompt to agent runtime at {}", url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "user_id": user_id,
                "user_role": role,
                "session_id": session_id,
                "message": content,
            }))
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("agent runtime unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "agent runtime returned {}",
                response.status()
            )));
        }

        let body: AgentResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("agent response malformed: {}", e)))?;
        Ok(body.frames)
    }
}
