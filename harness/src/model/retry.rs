//! Bounded retry with exponential backoff around a single [`Model`].
//!
//! ```text
//! attempt 1 ──ok──────────────────────────────► RawModelResponse
//!     │ err (transient, budget left)
//!     ▼ sleep(jitter(min(cap, base·2^0)))
//! attempt 2 ──ok──────────────────────────────► RawModelResponse
//!     │ err (transient, budget left)
//!     ▼ sleep(jitter(min(cap, base·2^1)))
//!   …
//! attempt 1+max_retries ──err───────────────────► ModelCallError
//! non-transient err at any attempt ─────────────► ModelCallError (no retry)
//! ```
//!
//! Every attempt re-sends the same prompt. Nothing is cached between calls.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Model, ModelCallError, ModelErrorKind, RawModelResponse};

/// Retry behaviour for one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = 1 + max_retries).
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff_base: Duration,
    /// Upper bound on a single delay.
    pub backoff_cap: Duration,
    /// Wall-clock budget for the whole call including sleeps.
    pub max_elapsed: Option<Duration>,
    /// Error kinds that may be retried.
    pub retryable_kinds: Vec<ModelErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
            max_elapsed: Some(Duration::from_secs(60)),
            retryable_kinds: vec![
                ModelErrorKind::Timeout,
                ModelErrorKind::RateLimited,
                ModelErrorKind::Transport,
            ],
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap.max(base);
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Option<Duration>) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn is_retryable(&self, kind: ModelErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }

    /// Un-jittered delay before retry number `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index.min(31));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }

    /// Equal jitter: half of the delay is fixed, the other half uniform random.
    pub fn jittered_delay(&self, retry_index: u32) -> Duration {
        let delay = self.delay_for(retry_index);
        let half = delay / 2;
        let spread = delay.saturating_sub(half);
        if spread.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=spread.as_millis() as u64);
        half + Duration::from_millis(extra)
    }
}

/// Wraps a [`Model`] with a [`RetryPolicy`].
pub struct RetryingModelCaller {
    model: Arc<dyn Model>,
    policy: RetryPolicy,
    label: String,
}

impl RetryingModelCaller {
    pub fn new(model: Arc<dyn Model>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            label: "model".to_string(),
        }
    }

    /// Name used in log lines (e.g. `"openai/gpt-4.1"`).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Call the model, retrying transient failures per the policy.
    pub async fn call(&self, prompt: &str) -> Result<RawModelResponse, ModelCallError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let attempt_start = Instant::now();

            match self.model.generate(prompt).await {
                Ok(reply) => {
                    debug!(
                        model = %self.label,
                        attempt,
                        latency_ms = attempt_start.elapsed().as_millis() as u64,
                        "model call succeeded"
                    );
                    return Ok(RawModelResponse {
                        text: reply.text,
                        latency: attempt_start.elapsed(),
                        provider_metadata: reply.metadata,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    if !self.policy.is_retryable(err.kind) {
                        warn!(model = %self.label, kind = %err.kind, error = %err.message, "non-retryable model error");
                        return Err(err);
                    }

                    let retries_used = attempt - 1;
                    if retries_used >= self.policy.max_retries {
                        warn!(
                            model = %self.label,
                            attempts = attempt,
                            kind = %err.kind,
                            "retry budget exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.jittered_delay(retries_used);
                    if let Some(budget) = self.policy.max_elapsed {
                        if started.elapsed() + delay > budget {
                            warn!(
                                model = %self.label,
                                attempts = attempt,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "retry wall-clock budget exhausted"
                            );
                            return Err(err);
                        }
                    }

                    warn!(
                        model = %self.label,
                        attempt,
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "transient model error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
