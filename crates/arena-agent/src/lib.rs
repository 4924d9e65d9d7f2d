//! LLM game-playing agent built on `arena-harness`.
//!
//! Provides the concrete model backends (OpenAI-compatible HTTP, Anthropic
//! Messages, rig-core), provider credential loading, and the [`Agent`] that
//! turns an observation into an always-legal action.

pub mod agent;
pub mod backends;
pub mod config;

pub use agent::{ActionMetadata, ActionRecord, Agent, AgentError, FallbackPolicy};
pub use backends::{
    build_model, build_model_or_unavailable, BackendKind, GenerationSettings, UnavailableModel,
};
pub use config::{api_key_with_fallback, load_config, ArenaConfig, Provider, ProviderConfig};
