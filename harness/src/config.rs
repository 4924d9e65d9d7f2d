//! Sampling and retry configuration.
//!
//! Constructed once at process start (usually as the `harness` section of the
//! agent's JSON config file) and threaded through constructors.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`ARENA_SAMPLER`, `ARENA_N_SAMPLES`,
//!    `ARENA_MAX_ATTEMPTS`, `ARENA_SEED`) via [`HarnessConfig::apply_env_overrides`]
//! 2. Values from the config file
//! 3. Built-in defaults

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{RetryPolicy, RetryingModelCaller};
use crate::parsing::soft::{DEFAULT_AMBIGUITY_MARGIN, DEFAULT_THRESHOLD};
use crate::parsing::{ChainedMoveParser, MoveParser};
use crate::sampling::{MajorityVoteSampler, RethinkSampler, Sampler, SamplerKind};

const DEFAULT_MAX_RETRIES_PER_CALL: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_CAP_MS: u64 = 8_000;
const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_N_SAMPLES: u32 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const ENV_SAMPLER: &str = "ARENA_SAMPLER";
const ENV_N_SAMPLES: &str = "ARENA_N_SAMPLES";
const ENV_MAX_ATTEMPTS: &str = "ARENA_MAX_ATTEMPTS";
const ENV_SEED: &str = "ARENA_SEED";

/// What the agent submits when sampling yields no legal move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Submit a uniformly random legal move.
    #[default]
    RandomLegal,
    /// Record an abstention. A random legal move is still submitted so the
    /// action stays valid.
    Abstain,
}

impl std::fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RandomLegal => write!(f, "random_legal"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

/// Error type for configuration validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Every recognized harness option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Retries after the first attempt of a single model call.
    pub max_retries_per_call: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Wall-clock bound for one sampling run. `None` disables the deadline.
    pub total_timeout_ms: Option<u64>,
    pub sampler_kind: SamplerKind,
    /// Concurrent calls for majority vote.
    pub n_samples: u32,
    /// Sequential attempts for rethink.
    pub max_attempts: u32,
    pub soft_match_threshold: f64,
    pub soft_match_ambiguity_margin: f64,
    pub fallback_policy: FallbackPolicy,
    /// Seed for the fallback RNG. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_retries_per_call: DEFAULT_MAX_RETRIES_PER_CALL,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            total_timeout_ms: Some(DEFAULT_TOTAL_TIMEOUT_MS),
            sampler_kind: SamplerKind::default(),
            n_samples: DEFAULT_N_SAMPLES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            soft_match_threshold: DEFAULT_THRESHOLD,
            soft_match_ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
            fallback_policy: FallbackPolicy::default(),
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_samples == 0 {
            return Err(ConfigError::invalid("n_samples", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if !(self.soft_match_threshold > 0.0 && self.soft_match_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "soft_match_threshold",
                format!("{} is outside (0, 1]", self.soft_match_threshold),
            ));
        }
        if !(0.0..1.0).contains(&self.soft_match_ambiguity_margin) {
            return Err(ConfigError::invalid(
                "soft_match_ambiguity_margin",
                format!("{} is outside [0, 1)", self.soft_match_ambiguity_margin),
            ));
        }
        if self.backoff_base_ms > self.backoff_cap_ms {
            return Err(ConfigError::invalid(
                "backoff_base_ms",
                format!(
                    "base {}ms exceeds cap {}ms",
                    self.backoff_base_ms, self.backoff_cap_ms
                ),
            ));
        }
        if self.total_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "total_timeout_ms",
                "must be positive (omit it to disable the deadline)",
            ));
        }
        Ok(())
    }

    /// Apply `ARENA_*` environment overrides. Unparseable values are logged
    /// and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var(ENV_SAMPLER) {
            match raw.parse() {
                Ok(kind) => self.sampler_kind = kind,
                Err(e) => warn!(var = ENV_SAMPLER, error = %e, "ignoring override"),
            }
        }
        override_number(ENV_N_SAMPLES, &mut self.n_samples);
        override_number(ENV_MAX_ATTEMPTS, &mut self.max_attempts);
        if let Ok(raw) = env::var(ENV_SEED) {
            match raw.trim().parse() {
                Ok(seed) => self.seed = Some(seed),
                Err(e) => warn!(var = ENV_SEED, error = %e, "ignoring override"),
            }
        }
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries_per_call)
            .with_backoff(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_cap_ms),
            )
            .with_max_elapsed(self.total_timeout())
    }

    /// Rule-based then soft parser with the configured threshold and margin.
    pub fn parser(&self) -> ChainedMoveParser {
        ChainedMoveParser::standard(self.soft_match_threshold, self.soft_match_ambiguity_margin)
    }

    /// The configured sampler around `caller`.
    pub fn build_sampler(
        &self,
        caller: Arc<RetryingModelCaller>,
        parser: Arc<dyn MoveParser>,
    ) -> Arc<dyn Sampler> {
        match self.sampler_kind {
            SamplerKind::Majority => Arc::new(
                MajorityVoteSampler::new(caller, parser, self.n_samples)
                    .with_total_timeout(self.total_timeout()),
            ),
            SamplerKind::Rethink => Arc::new(
                RethinkSampler::new(caller, parser, self.max_attempts)
                    .with_total_timeout(self.total_timeout()),
            ),
        }
    }
}

fn override_number(var: &'static str, target: &mut u32) {
    if let Ok(raw) = env::var(var) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(e) => warn!(var, error = %e, "ignoring override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampler_kind, SamplerKind::Majority);
        assert_eq!(config.soft_match_threshold, 0.7);
        assert_eq!(config.fallback_policy, FallbackPolicy::RandomLegal);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{"sampler_kind": "rethink", "max_attempts": 4, "fallback_policy": "abstain"}"#,
        )
        .unwrap();
        assert_eq!(config.sampler_kind, SamplerKind::Rethink);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.fallback_policy, FallbackPolicy::Abstain);
        assert_eq!(config.n_samples, DEFAULT_N_SAMPLES);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = HarnessConfig {
            n_samples: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Invalid { field: "n_samples", .. })
        ));

        let bad = HarnessConfig {
            soft_match_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = HarnessConfig {
            soft_match_ambiguity_margin: -0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = HarnessConfig {
            backoff_base_ms: 10_000,
            backoff_cap_ms: 100,
            ..Default::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("backoff_base_ms"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = HarnessConfig {
            max_retries_per_call: 2,
            backoff_base_ms: 100,
            backoff_cap_ms: 400,
            total_timeout_ms: None,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(5), Duration::from_millis(400));
        assert_eq!(policy.max_elapsed, None);
    }

    #[test]
    fn test_build_sampler_kind_and_budget() {
        let model = Arc::new(crate::model::MockModel::new());
        let caller = Arc::new(RetryingModelCaller::new(model, RetryPolicy::none()));
        let parser: Arc<dyn MoveParser> = Arc::new(HarnessConfig::default().parser());

        let majority = HarnessConfig {
            n_samples: 7,
            ..Default::default()
        };
        let sampler = majority.build_sampler(caller.clone(), parser.clone());
        assert_eq!(sampler.kind(), SamplerKind::Majority);
        assert_eq!(sampler.budget(), 7);

        let rethink = HarnessConfig {
            sampler_kind: SamplerKind::Rethink,
            max_attempts: 2,
            ..Default::default()
        };
        let sampler = rethink.build_sampler(caller, parser);
        assert_eq!(sampler.kind(), SamplerKind::Rethink);
        assert_eq!(sampler.budget(), 2);
    }
}
