//! Concrete [`Model`] backends.
//!
//! | Backend                  | Transport                 | Providers                        |
//! |--------------------------|---------------------------|----------------------------------|
//! | `OpenAiCompatibleModel`  | reqwest `/chat/completions` | openai, gemini, together, xai  |
//! | `AnthropicModel`         | reqwest `/v1/messages`    | anthropic                        |
//! | `RigModel`               | rig-core completions agent | any OpenAI-compatible endpoint  |
//!
//! All of them map transport failures onto [`ModelErrorKind`] so the retry
//! layer can tell transient errors from fatal ones.

pub mod anthropic;
pub mod openai;
pub mod rig_agent;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arena_harness::{Model, ModelCallError, ModelErrorKind, ModelReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{api_key_with_fallback, ArenaConfig, Provider};

pub use self::anthropic::AnthropicModel;
pub use self::openai::OpenAiCompatibleModel;
pub use self::rig_agent::RigModel;

/// Longest error body kept in a `ModelCallError` message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Which client implementation talks to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain reqwest JSON calls.
    #[default]
    Http,
    /// rig-core completion agent (OpenAI-compatible providers only).
    Rig,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub system_prompt: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(90),
            system_prompt: None,
        }
    }
}

/// Map a reqwest send/decode failure onto an error kind.
pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> ModelCallError {
    let kind = if err.is_timeout() {
        ModelErrorKind::Timeout
    } else if let Some(status) = err.status() {
        ModelErrorKind::from_status(status.as_u16())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ModelErrorKind::Transport
    } else if err.is_decode() {
        ModelErrorKind::Other
    } else {
        ModelErrorKind::Transport
    };
    ModelCallError::new(kind, err.to_string())
}

/// Build the error for a non-success HTTP status.
pub(crate) fn status_error(provider: &str, status: u16, body: &str) -> ModelCallError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    ModelCallError::new(
        ModelErrorKind::from_status(status),
        format!("{provider} API error ({status}): {body}"),
    )
}

/// Construct the backend for `provider` from the loaded config.
///
/// The API key comes from `api_key` if given, else the config file, else the
/// provider's environment variable.
pub fn build_model(
    provider: Provider,
    model: &str,
    backend: BackendKind,
    api_key: Option<&str>,
    config: &ArenaConfig,
    settings: GenerationSettings,
) -> anyhow::Result<Arc<dyn Model>> {
    let key = api_key_with_fallback(api_key, provider, config).with_context(|| {
        format!(
            "no API key for {provider}: pass --api-key, set it in the config file, or export {}",
            provider.env_var()
        )
    })?;
    let base_url = config.base_url(provider);

    let built: Arc<dyn Model> = match (backend, provider) {
        (BackendKind::Rig, Provider::Anthropic) => {
            anyhow::bail!("the rig backend only supports OpenAI-compatible providers")
        }
        (BackendKind::Rig, _) => Arc::new(
            RigModel::new(&base_url, &key, model, settings)
                .with_context(|| format!("failed to build rig client for {provider}"))?,
        ),
        (BackendKind::Http, Provider::Anthropic) => Arc::new(
            AnthropicModel::new(&base_url, &key, model, settings)
                .context("failed to build Anthropic client")?,
        ),
        (BackendKind::Http, _) => Arc::new(
            OpenAiCompatibleModel::new(provider, &base_url, &key, model, settings)
                .with_context(|| format!("failed to build HTTP client for {provider}"))?,
        ),
    };
    Ok(built)
}

/// Stand-in for a backend that could not be constructed. Every call fails
/// with the same non-transient error.
#[derive(Debug, Clone)]
pub struct UnavailableModel {
    kind: ModelErrorKind,
    reason: String,
}

impl UnavailableModel {
    pub fn new(kind: ModelErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Model for UnavailableModel {
    async fn generate(&self, _prompt: &str) -> Result<ModelReply, ModelCallError> {
        Err(ModelCallError::new(self.kind, self.reason.clone()))
    }
}

/// [`build_model`], degrading to an [`UnavailableModel`] on failure.
///
/// A missing API key maps to `Auth`; any other construction failure to
/// `MalformedRequest`.
pub fn build_model_or_unavailable(
    provider: Provider,
    model: &str,
    backend: BackendKind,
    api_key: Option<&str>,
    config: &ArenaConfig,
    settings: GenerationSettings,
) -> Arc<dyn Model> {
    match build_model(provider, model, backend, api_key, config, settings) {
        Ok(built) => built,
        Err(e) => {
            let kind = if api_key_with_fallback(api_key, provider, config).is_none() {
                ModelErrorKind::Auth
            } else {
                ModelErrorKind::MalformedRequest
            };
            let reason = format!("{e:#}");
            warn!(%provider, model, kind = %kind, error = %reason, "model backend unavailable, moves will fall back");
            Arc::new(UnavailableModel::new(kind, reason))
        }
    }
}
