//! OpenAI-compatible `/chat/completions` backend.
//!
//! Serves OpenAI itself plus every provider exposing the same wire format
//! (Gemini's OpenAI endpoint, Together, xAI, local vLLM servers).

use async_trait::async_trait;
use arena_harness::{Model, ModelCallError, ModelErrorKind, ModelReply};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{classify_reqwest_error, status_error, GenerationSettings};
use crate::config::Provider;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    provider: Provider,
    endpoint: String,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

impl OpenAiCompatibleModel {
    pub fn new(
        provider: Provider,
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
            provider,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            settings,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Model for OpenAiCompatibleModel {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelCallError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.settings.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.provider.to_string(), status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let choice = chat.choices.into_iter().next().ok_or_else(|| {
            ModelCallError::new(ModelErrorKind::Other, "response contained no choices")
        })?;

        let mut reply = ModelReply::new(choice.message.content.unwrap_or_default())
            .with_metadata("provider", self.provider.to_string())
            .with_metadata("model", chat.model.unwrap_or_else(|| self.model.clone()));
        if let Some(reason) = choice.finish_reason {
            reply = reply.with_metadata("finish_reason", reason);
        }
        if let Some(usage) = chat.usage {
            if let Some(n) = usage.prompt_tokens {
                reply = reply.with_metadata("prompt_tokens", n.to_string());
            }
            if let Some(n) = usage.completion_tokens {
                reply = reply.with_metadata("completion_tokens", n.to_string());
            }
        }

        debug!(provider = %self.provider, chars = reply.text.len(), "chat completion received");
        Ok(reply)
    }
}
