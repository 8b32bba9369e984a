//! LLM inference client.
//!
//! Speaks an OpenAI-compatible wire format: chat completions (text or
//! mixed text/image content), embeddings, and a safety classifier. Model
//! choice is configuration; nothing here depends on a particular vendor.
//!
//! The safety classifier fails open: a transport error must never block a
//! user interaction, so it degrades to "safe" with a logged warning.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::configuration::LlmSettings;
use crate::errors::{ApiError, ApiResult};

/// One chat message. `content` is either a plain string or an array of
/// `{type: "text" | "image_url", ...}` parts for vision prompts.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: serde_json::Value,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.to_string(),
            content: serde_json::Value::String(content.into()),
        }
    }

    /// User message carrying a prompt plus one base64 data-URL image.
    pub fn user_with_image(prompt: &str, image_data_url: &str) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: serde_json::json!([
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": image_data_url}}
            ]),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

/// Verdict from the input-safety classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    chat_model: String,
    embeddings_model: String,
    safety_model: Option<String>,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Self {
        LlmClient {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            chat_model: settings.chat_model.clone(),
            embeddings_model: settings.embeddings_model.clone(),
            safety_model: settings.safety_model.clone(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(format!("{}{}", self.endpoint, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Runs a chat completion and returns the assistant text.
    pub async fn get_completion(&self, messages: &[ChatMessage]) -> ApiResult<String> {
        debug!("Chat completion with {} messages", messages.len());
        let response = self
            .request("/chat/completions")
            .json(&serde_json::json!({
                "model": self.chat_model,
                "messages": messages,
            }))
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("LLM endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "LLM endpoint returned {}",
                response.status()
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("LLM response malformed: {}", e)))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApiError::Internal("LLM response had no choices".to_string()))
    }

    pub async fn get_embeddings(&self, inputs: &[String]) -> ApiResult<Vec<Vec<f64>>> {
        let response = self
            .request("/embeddings")
            .json(&serde_json::json!({
                "model": self.embeddings_model,
                "input": inputs,
            }))
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("embeddings endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "embeddings endpoint returned {}",
                response.status()
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("embeddings response malformed: {}", e)))?;
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Classifies user input. Fails open on transport or parse errors.
    pub async fn check_input(&self, text: &str) -> SafetyVerdict {
        let Some(model) = &self.safety_model else {
            return SafetyVerdict {
                is_safe: true,
                categories: vec![],
            };
        };

        let result = self
            .request("/chat/completions")
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": text}],
            }))
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Safety classifier unreachable, failing open: {}", e);
                return SafetyVerdict {
                    is_safe: true,
                    categories: vec![],
                };
            }
        };

        let body: Result<CompletionResponse, _> = response.json().await;
        match body {
            Ok(completion) => {
                let text = completion
                    .choices
                    .first()
                    .map(|c| c.message.content.trim().to_string())
                    .unwrap_or_default();
                // Classifier convention: "safe" or "unsafe\n<categories>".
                if text.to_lowercase().starts_with("unsafe") {
                    let categories = text
                        .lines()
                        .skip(1)
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect();
                    SafetyVerdict {
                        is_safe: false,
                        categories,
                    }
                } else {
                    SafetyVerdict {
                        is_safe: true,
                        categories: vec![],
                    }
                }
            }
            Err(e) => {
                warn!("Safety classifier response malformed, failing open: {}", e);
                SafetyVerdict {
                    is_safe: true,
                    categories: vec![],
                }
            }
        }
    }
}
