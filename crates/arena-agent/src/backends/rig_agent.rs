//! rig-core backed model: an OpenAI-compatible completions agent.

use async_trait::async_trait;
use arena_harness::{Model, ModelCallError, ModelErrorKind, ModelReply};
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use super::GenerationSettings;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

const DEFAULT_PREAMBLE: &str = "You are a strong game player. Answer with exactly one legal move.";

pub struct RigModel {
    agent: OaiAgent,
    model: String,
}

impl RigModel {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        settings: GenerationSettings,
    ) -> anyhow::Result<Self> {
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(base_url)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build rig client: {e}"))?;

        let agent = client
            .agent(model)
            .preamble(settings.system_prompt.as_deref().unwrap_or(DEFAULT_PREAMBLE))
            .temperature(settings.temperature)
            .max_tokens(u64::from(settings.max_tokens))
            .build();

        Ok(Self {
            agent,
            model: model.to_string(),
        })
    }
}

/// Classify a rig prompt error from its rendered message.
///
/// rig flattens provider HTTP failures into strings, so status codes and
/// reqwest phrases are matched textually.
pub(crate) fn classify_rig_error(message: &str) -> ModelErrorKind {
    let lower = message.to_ascii_lowercase();
    if message.contains("401") || message.contains("403") || lower.contains("unauthorized") {
        ModelErrorKind::Auth
    } else if message.contains("429") || lower.contains("rate limit") {
        ModelErrorKind::RateLimited
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ModelErrorKind::Timeout
    } else if message.contains("500")
        || message.contains("502")
        || message.contains("503")
        || message.contains("504")
        || lower.contains("connection")
        || lower.contains("error sending request")
        || lower.contains("broken pipe")
        || lower.contains("reset by peer")
    {
        ModelErrorKind::Transport
    } else if message.contains("400") || message.contains("404") || message.contains("422") {
        ModelErrorKind::MalformedRequest
    } else {
        ModelErrorKind::Other
    }
}

#[async_trait]
impl Model for RigModel {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelCallError> {
        let prompt = prompt.to_string();
        let text = self.agent.prompt(&prompt).await.map_err(|e| {
            let message = e.to_string();
            ModelCallError::new(classify_rig_error(&message), message)
        })?;

        debug!(model = %self.model, chars = text.len(), "rig completion received");
        Ok(ModelReply::new(text)
            .with_metadata("backend", "rig")
            .with_metadata("model", self.model.clone()))
    }
}
