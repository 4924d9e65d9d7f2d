//! Move extraction and legality recovery for LLM game agents.
//!
//! ```text
//! Sampler ──► RetryingModelCaller ──► Model (injected backend)
//!    │              raw text
//!    ▼
//! ChainedMoveParser ──► RuleBasedMoveParser ──► SoftMoveParser
//!    │
//!    ▼
//! ParseResult::Matched { formal_id ∈ LegalMoveSet } | Unmatched { reason }
//! ```
//!
//! This crate does no HTTP and knows no game rules. The engine supplies the
//! [`LegalMoveSet`]; backends implement [`Model`].

pub mod config;
pub mod legal_moves;
pub mod model;
pub mod observation;
pub mod parsing;
pub mod prompt;
pub mod sampling;

pub use config::{ConfigError, FallbackPolicy, HarnessConfig};
pub use legal_moves::{ActionId, LegalMove, LegalMoveError, LegalMoveSet};
pub use model::{
    Model, ModelCallError, ModelErrorKind, ModelReply, RawModelResponse, RetryPolicy,
    RetryingModelCaller,
};
pub use observation::{GameConfiguration, Observation};
pub use parsing::{
    ChainedMoveParser, MoveParser, ParseResult, RuleBasedMoveParser, SoftMoveParser,
    UnmatchedReason,
};
pub use prompt::{DefaultPromptBuilder, PromptBuilder};
pub use sampling::{
    Feedback, MajorityVoteSampler, RethinkSampler, Sampler, SamplerKind, SamplingError,
    SamplingOutcome, Vote,
};
