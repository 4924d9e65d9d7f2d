//! Sampling strategies that turn model calls into a legal move.
//!
//! | Strategy   | Calls                     | Decision                              |
//! |------------|---------------------------|---------------------------------------|
//! | `majority` | `n` concurrent, same prompt | most-voted `formal_id`, earliest first vote on ties |
//! | `rethink`  | sequential, feedback-driven | first `Matched` parse                 |
//!
//! Both samplers receive the prompt as a closure so the rethink path can
//! re-render it with [`Feedback`] about the previous failed attempt.

pub mod majority;
pub mod rethink;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::legal_moves::{ActionId, LegalMoveSet};
use crate::model::{ModelCallError, RawModelResponse};
use crate::parsing::{ParseResult, UnmatchedReason};

pub use majority::MajorityVoteSampler;
pub use rethink::RethinkSampler;

/// Renders the prompt for one model call, optionally folding in feedback.
pub type PromptFn<'a> = dyn Fn(Option<&Feedback>) -> String + Send + Sync + 'a;

// ── SamplerKind ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[default]
    Majority,
    Rethink,
}

impl SamplerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Majority => "majority",
            Self::Rethink => "rethink",
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "majority" | "majority_vote" => Ok(Self::Majority),
            "rethink" => Ok(Self::Rethink),
            other => Err(format!("unknown sampler kind: {other}")),
        }
    }
}

// ── Outcome types ────────────────────────────────────────────────────────────

/// Number of responses that parsed to one formal id in a majority round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub formal_id: ActionId,
    pub count: u32,
}

/// Result of one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOutcome {
    pub result: ParseResult,
    /// Model calls issued (never more than the sampler's budget).
    pub attempts_used: u32,
    /// Successful responses in call-issue order.
    pub raw_responses: Vec<RawModelResponse>,
    /// Tally, highest count first. Empty for rethink.
    pub votes: Vec<Vote>,
    pub kind: SamplerKind,
}

/// What the rethink path tells the model about its previous attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// The previous response text, verbatim.
    pub previous_text: String,
    pub reason: UnmatchedReason,
    /// Canonical texts of every legal move, in enumeration order.
    pub legal_moves: Vec<String>,
}

impl Feedback {
    pub fn new(
        previous_text: impl Into<String>,
        reason: UnmatchedReason,
        legal_moves: &LegalMoveSet,
    ) -> Self {
        Self {
            previous_text: previous_text.into(),
            reason,
            legal_moves: legal_moves.texts(),
        }
    }
}

/// Sampling could not run to completion.
///
/// Parse failures and transient model errors are folded into an `Unmatched`
/// outcome instead. Only non-transient model failures surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SamplingError {
    #[error("model unavailable after {attempts_used} attempt(s): {error}")]
    ModelUnavailable {
        error: ModelCallError,
        /// Sampler attempts issued before giving up.
        attempts_used: u32,
    },
}

impl SamplingError {
    pub fn attempts_used(&self) -> u32 {
        match self {
            Self::ModelUnavailable { attempts_used, .. } => *attempts_used,
        }
    }
}

// ── Sampler trait ────────────────────────────────────────────────────────────

#[async_trait]
pub trait Sampler: Send + Sync {
    fn kind(&self) -> SamplerKind;

    /// Upper bound on `SamplingOutcome::attempts_used`.
    fn budget(&self) -> u32;

    async fn sample(
        &self,
        prompt: &PromptFn<'_>,
        legal_moves: &LegalMoveSet,
    ) -> Result<SamplingOutcome, SamplingError>;
}

/// Absolute deadline `total_timeout` from now. A timeout too large to
/// represent means no deadline.
pub(crate) fn deadline_after(total_timeout: Option<Duration>) -> Option<Instant> {
    total_timeout.and_then(|t| Instant::now().checked_add(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_kind_parses() {
        assert_eq!("majority".parse::<SamplerKind>().unwrap(), SamplerKind::Majority);
        assert_eq!(" Rethink ".parse::<SamplerKind>().unwrap(), SamplerKind::Rethink);
        assert!("best_of".parse::<SamplerKind>().is_err());
        assert_eq!(
            serde_json::to_string(&SamplerKind::Rethink).unwrap(),
            "\"rethink\""
        );
    }

    #[test]
    fn feedback_lists_legal_moves_in_order() {
        let legal = LegalMoveSet::from_pairs([(2, "e5"), (1, "e4")]).unwrap();
        let fb = Feedback::new("Ke9", UnmatchedReason::NoRuleMatch, &legal);
        assert_eq!(fb.legal_moves, vec!["e5", "e4"]);
        assert_eq!(fb.previous_text, "Ke9");
    }

    #[test]
    fn deadline_saturates_to_none() {
        assert!(deadline_after(None).is_none());
        assert!(deadline_after(Some(Duration::MAX)).is_none());
        assert!(deadline_after(Some(Duration::from_secs(5))).is_some());
    }
}
