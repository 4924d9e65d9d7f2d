//! Anthropic Messages API backend.

use async_trait::async_trait;
use arena_harness::{Model, ModelCallError, ModelErrorKind, ModelReply};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{classify_reqwest_error, status_error, GenerationSettings};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

pub struct AnthropicModel {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

impl AnthropicModel {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        settings: GenerationSettings,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            settings,
        })
    }
}

/// Concatenate the text blocks of a response, skipping thinking/tool blocks.
fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl Model for AnthropicModel {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelCallError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: self.settings.system_prompt.as_deref(),
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("anthropic", status, &body));
        }

        let message: MessagesResponse = response
            .json()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if message.content.is_empty() {
            return Err(ModelCallError::new(
                ModelErrorKind::Other,
                "response contained no content blocks",
            ));
        }

        let mut reply = ModelReply::new(collect_text(&message.content))
            .with_metadata("provider", "anthropic")
            .with_metadata("model", message.model.unwrap_or_else(|| self.model.clone()));
        if let Some(reason) = message.stop_reason {
            reply = reply.with_metadata("finish_reason", reason);
        }
        if let Some(usage) = message.usage {
            if let Some(n) = usage.input_tokens {
                reply = reply.with_metadata("prompt_tokens", n.to_string());
            }
            if let Some(n) = usage.output_tokens {
                reply = reply.with_metadata("completion_tokens", n.to_string());
            }
        }

        debug!(chars = reply.text.len(), "anthropic message received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_empty_system() {
        let request = MessagesRequest {
            model: "claude-sonnet-4",
            max_tokens: 256,
            temperature: 0.0,
            system: None,
            messages: [UserMessage {
                role: "user",
                content: "Your move?",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"], "Your move?");
    }

    #[test]
    fn test_collect_text_skips_other_blocks() {
        let message: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "I play "},
                    {"type": "text", "text": "Nf3"}
                ],
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();
        assert_eq!(collect_text(&message.content), "I play Nf3");
    }

    #[test]
    fn test_endpoint() {
        let model = AnthropicModel::new(
            "https://api.anthropic.com/",
            "k",
            "claude",
            GenerationSettings::default(),
        )
        .unwrap();
        assert_eq!(model.endpoint, "https://api.anthropic.com/v1/messages");
    }
}
