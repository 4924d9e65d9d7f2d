//! Model capability and call error taxonomy.
//!
//! The only thing the harness needs from a model backend is "generate text
//! from input text". Backends (SDK or plain HTTP) implement [`Model`] and are
//! injected into a [`RetryingModelCaller`].
//!
//! ## Error kinds
//!
//! | Kind             | Transient | Typical source            |
//! |------------------|-----------|---------------------------|
//! | Timeout          | yes       | client or gateway timeout |
//! | RateLimited      | yes       | HTTP 429                  |
//! | Transport        | yes       | HTTP 5xx, connect reset   |
//! | MalformedRequest | no        | HTTP 400/404/422          |
//! | Auth             | no        | HTTP 401/403              |
//! | Other            | no        | undecodable body, etc.    |

pub mod retry;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use retry::{RetryPolicy, RetryingModelCaller};

/// Classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// The request did not complete in time.
    Timeout,
    /// Provider rate limit.
    RateLimited,
    /// Network failure or 5xx-equivalent backend error.
    Transport,
    /// The provider rejected the request shape.
    MalformedRequest,
    /// Missing or rejected credentials.
    Auth,
    /// Anything else (e.g. unreadable response body).
    Other,
}

impl ModelErrorKind {
    /// Kinds that are worth retrying with the same prompt.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Transport)
    }

    /// Map an HTTP status code onto an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Transport,
            400..=499 => Self::MalformedRequest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transport => write!(f, "transport"),
            Self::MalformedRequest => write!(f, "malformed_request"),
            Self::Auth => write!(f, "auth"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A failed model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("model call failed [{kind}]: {message}")]
pub struct ModelCallError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelCallError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::RateLimited, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Transport, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Auth, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// What a backend returns for one successful generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    /// Provider-specific details (model name, finish reason, token counts).
    pub metadata: BTreeMap<String, String>,
}

impl ModelReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A model response as seen by the parsers, produced by [`RetryingModelCaller`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawModelResponse {
    pub text: String,
    /// Wall-clock time of the successful attempt.
    pub latency: Duration,
    pub provider_metadata: BTreeMap<String, String>,
    /// Attempts spent by the retrying caller, including the successful one.
    pub attempts: u32,
}

/// Text generation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ModelCallError>;
}
