//! Provider credentials and the on-disk config file.
//!
//! ```json
//! {
//!   "harness": { "sampler_kind": "rethink", "max_attempts": 3 },
//!   "openai": { "api_key": "sk-...", "base_url": "https://api.openai.com/v1" },
//!   "anthropic": { "api_key": "..." }
//! }
//! ```
//!
//! ## Lookup order
//!
//! | What      | Order                                                         |
//! |-----------|---------------------------------------------------------------|
//! | file      | `--config`, `~/.game_arena_config.json`, `./game_arena_config.json` |
//! | API key   | explicit flag, config file, provider environment variable      |
//! | base URL  | config file, provider default                                  |
//!
//! A missing file yields defaults. An unreadable or invalid file is logged
//! and also yields defaults.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use arena_harness::HarnessConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CONFIG_FILE_NAME: &str = "game_arena_config.json";
const HOME_CONFIG_FILE_NAME: &str = ".game_arena_config.json";

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Together,
    Xai,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::Together,
        Self::Xai,
    ];

    /// Environment variable consulted when no key is configured.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Together => "TOGETHER_API_KEY",
            Self::Xai => "XAI_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Together => "https://api.together.xyz/v1",
            Self::Xai => "https://api.x.ai/v1",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Gemini => write!(f, "gemini"),
            Self::Together => write!(f, "together"),
            Self::Xai => write!(f, "xai"),
        }
    }
}

/// Credentials and endpoint for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Everything read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub harness: HarnessConfig,
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gemini: ProviderConfig,
    pub together: ProviderConfig,
    pub xai: ProviderConfig,
}

impl ArenaConfig {
    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Gemini => &self.gemini,
            Provider::Together => &self.together,
            Provider::Xai => &self.xai,
        }
    }

    /// Configured base URL, else the provider default. Trailing `/` removed.
    pub fn base_url(&self, provider: Provider) -> String {
        self.provider(provider)
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Read and parse one config file.
pub fn read_config(path: &Path) -> anyhow::Result<ArenaConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Default search locations, in priority order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        paths.push(PathBuf::from(home).join(HOME_CONFIG_FILE_NAME));
    }
    if let Ok(cwd) = env::current_dir() {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Load the config from `path`, or from the first existing default location.
///
/// Never fails: problems are logged and defaults returned.
pub fn load_config(path: Option<&Path>) -> ArenaConfig {
    match path {
        Some(path) => load_or_default(path),
        None => load_first_existing(&default_config_paths()),
    }
}

fn load_first_existing(candidates: &[PathBuf]) -> ArenaConfig {
    match candidates.iter().find(|p| p.exists()) {
        Some(path) => load_or_default(path),
        None => {
            debug!("no config file found, using defaults");
            ArenaConfig::default()
        }
    }
}

fn load_or_default(path: &Path) -> ArenaConfig {
    match read_config(path) {
        Ok(config) => {
            debug!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "could not load config, using defaults");
            ArenaConfig::default()
        }
    }
}

/// Resolve an API key: explicit value, then config file, then environment.
pub fn api_key_with_fallback(
    explicit: Option<&str>,
    provider: Provider,
    config: &ArenaConfig,
) -> Option<String> {
    resolve_api_key(explicit, provider, config, |var| env::var(var).ok())
}

fn resolve_api_key(
    explicit: Option<&str>,
    provider: Provider,
    config: &ArenaConfig,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(key) = explicit {
        return Some(key.to_string());
    }
    if let Some(key) = config
        .provider(provider)
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }
    lookup_env(provider.env_var()).filter(|k| !k.is_empty())
}
