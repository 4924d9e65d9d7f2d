//! The agent boundary: observation in, always-legal action out.
//!
//! ```text
//! act(observation, configuration)
//!   ├── PromptBuilder::build(observation, configuration, feedback?)
//!   ├── Sampler::sample(prompt, legal_moves)
//!   │     ├── Ok(Matched)   → submit formal_id
//!   │     ├── Ok(Unmatched) → fallback
//!   │     └── Err(_)        → fallback
//!   └── ActionRecord
//! ```
//!
//! Fallback picks a uniformly random legal move from a seedable RNG, so the
//! submitted id is always a member of the observation's legal-move set.

use std::sync::{Arc, Mutex};

use arena_harness::{
    ActionId, Feedback, GameConfiguration, HarnessConfig, LegalMoveSet, Observation,
    PromptBuilder, RetryingModelCaller, Sampler, SamplerKind,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use arena_harness::FallbackPolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("observation has no legal moves")]
    NoLegalMoves,
}

/// How the submitted action was arrived at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMetadata {
    /// Parser that produced the match. `None` when the fallback fired.
    pub parser_used: Option<String>,
    pub attempts_used: u32,
    pub sampler_kind: SamplerKind,
    pub fallback_triggered: bool,
    /// Set under [`FallbackPolicy::Abstain`] when the fallback fired.
    pub abstained: bool,
    /// Unmatched reason or sampling error behind a fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// The action handed back to the game engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub submitted_action_id: ActionId,
    pub submitted_action_text: String,
    pub metadata: ActionMetadata,
}

/// Binds a sampler, a prompt builder and a fallback policy.
pub struct Agent {
    sampler: Arc<dyn Sampler>,
    prompt_builder: Arc<dyn PromptBuilder>,
    fallback_policy: FallbackPolicy,
    rng: Mutex<StdRng>,
}

impl Agent {
    /// `seed = None` seeds the fallback RNG from OS entropy.
    pub fn new(
        sampler: Arc<dyn Sampler>,
        prompt_builder: Arc<dyn PromptBuilder>,
        fallback_policy: FallbackPolicy,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sampler,
            prompt_builder,
            fallback_policy,
            rng: Mutex::new(rng),
        }
    }

    /// Wire the configured sampler and parser chain around `caller`.
    pub fn from_config(
        config: &HarnessConfig,
        caller: Arc<RetryingModelCaller>,
        prompt_builder: Arc<dyn PromptBuilder>,
    ) -> Self {
        let sampler = config.build_sampler(caller, Arc::new(config.parser()));
        Self::new(sampler, prompt_builder, config.fallback_policy, config.seed)
    }

    pub fn sampler_kind(&self) -> SamplerKind {
        self.sampler.kind()
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback_policy
    }

    /// Choose and return one action for `observation`.
    ///
    /// Fails only when the observation offers no legal moves. Model outages
    /// and unparseable answers end in a fallback move instead.
    pub async fn act(
        &self,
        observation: &Observation,
        configuration: &GameConfiguration,
    ) -> Result<ActionRecord, AgentError> {
        let legal_moves = &observation.legal_moves;
        if legal_moves.is_empty() {
            return Err(AgentError::NoLegalMoves);
        }

        let prompt_builder = &self.prompt_builder;
        let prompt = |feedback: Option<&Feedback>| {
            prompt_builder.build(observation, configuration, feedback)
        };

        let sampler_kind = self.sampler.kind();
        let (attempts_used, failure_reason) = match self.sampler.sample(&prompt, legal_moves).await {
            Ok(outcome) => {
                debug!(
                    sampler = %sampler_kind,
                    attempts = outcome.attempts_used,
                    responses = outcome.raw_responses.len(),
                    votes = outcome.votes.len(),
                    "sampling finished"
                );
                match outcome.result.formal_id().and_then(|id| legal_moves.get(id)) {
                    Some(chosen) => {
                        info!(
                            action_id = chosen.id,
                            action = %chosen.text,
                            sampler = %sampler_kind,
                            attempts = outcome.attempts_used,
                            "submitting sampled move"
                        );
                        return Ok(ActionRecord {
                            submitted_action_id: chosen.id,
                            submitted_action_text: chosen.text.clone(),
                            metadata: ActionMetadata {
                                parser_used: outcome.result.matched_by().map(str::to_string),
                                attempts_used: outcome.attempts_used,
                                sampler_kind,
                                fallback_triggered: false,
                                abstained: false,
                                failure_reason: None,
                            },
                        });
                    }
                    None => {
                        let reason = match outcome.result.unmatched_reason() {
                            Some(reason) => reason.to_string(),
                            None => "matched move not in legal set".to_string(),
                        };
                        (outcome.attempts_used, reason)
                    }
                }
            }
            Err(e) => (e.attempts_used(), e.to_string()),
        };

        self.fallback(legal_moves, sampler_kind, attempts_used, failure_reason)
    }

    fn fallback(
        &self,
        legal_moves: &LegalMoveSet,
        sampler_kind: SamplerKind,
        attempts_used: u32,
        failure_reason: String,
    ) -> Result<ActionRecord, AgentError> {
        let chosen = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            legal_moves
                .as_slice()
                .choose(&mut *rng)
                .ok_or(AgentError::NoLegalMoves)?
                .clone()
        };

        let abstained = self.fallback_policy == FallbackPolicy::Abstain;
        warn!(
            action_id = chosen.id,
            action = %chosen.text,
            policy = %self.fallback_policy,
            reason = %failure_reason,
            "no usable model move, submitting random legal move"
        );

        Ok(ActionRecord {
            submitted_action_id: chosen.id,
            submitted_action_text: chosen.text,
            metadata: ActionMetadata {
                parser_used: None,
                attempts_used,
                sampler_kind,
                fallback_triggered: true,
                abstained,
                failure_reason: Some(failure_reason),
            },
        })
    }
}
