//! Free-text to legal-move parsing.
//!
//! ## Sub-modules
//!
//! | Module      | Purpose                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `normalize` | Notation cleanup and alias tables shared by the parsers   |
//! | `rules`     | Ordered extraction rules, exact match only                |
//! | `soft`      | Alias rewriting plus similarity scoring against legal set |
//! | `chain`     | First-match composition of parsers                        |
//!
//! Every parser is a pure function of `(text, legal_moves)`. A `Matched`
//! result always carries an id taken from the supplied [`LegalMoveSet`].

pub mod chain;
pub mod normalize;
pub mod rules;
pub mod soft;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::legal_moves::{ActionId, LegalMove, LegalMoveSet};

pub use chain::ChainedMoveParser;
pub use rules::{ExtractionRule, RuleBasedMoveParser};
pub use soft::SoftMoveParser;

/// Why a parse (or a whole sampling run) produced no legal move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No extraction rule produced a candidate equal to a legal move.
    NoRuleMatch,
    /// Two or more legal moves scored within the ambiguity margin.
    Ambiguous,
    /// No legal move cleared the similarity threshold.
    BelowThreshold,
    /// A chain with no member parsers.
    NoParsers,
    /// Majority vote: no response parsed to a legal move.
    NoVotes,
    /// Rethink: every attempt failed.
    AttemptsExhausted,
    /// The overall sampling deadline passed before a legal move was found.
    Timeout,
}

impl UnmatchedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoRuleMatch => "no_rule_match",
            Self::Ambiguous => "ambiguous",
            Self::BelowThreshold => "below_threshold",
            Self::NoParsers => "no_parsers",
            Self::NoVotes => "no_votes",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one parse attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseResult {
    Matched {
        formal_id: ActionId,
        canonical_text: String,
        /// Name of the parser that produced the match.
        matched_by: String,
    },
    Unmatched {
        reason: UnmatchedReason,
    },
}

impl ParseResult {
    pub fn matched(legal_move: &LegalMove, parser: &str) -> Self {
        Self::Matched {
            formal_id: legal_move.id,
            canonical_text: legal_move.text.clone(),
            matched_by: parser.to_string(),
        }
    }

    pub fn unmatched(reason: UnmatchedReason) -> Self {
        Self::Unmatched { reason }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn formal_id(&self) -> Option<ActionId> {
        match self {
            Self::Matched { formal_id, .. } => Some(*formal_id),
            Self::Unmatched { .. } => None,
        }
    }

    pub fn matched_by(&self) -> Option<&str> {
        match self {
            Self::Matched { matched_by, .. } => Some(matched_by),
            Self::Unmatched { .. } => None,
        }
    }

    pub fn unmatched_reason(&self) -> Option<UnmatchedReason> {
        match self {
            Self::Matched { .. } => None,
            Self::Unmatched { reason } => Some(*reason),
        }
    }
}

/// A pure text-to-move parser.
pub trait MoveParser: Send + Sync {
    /// Stable name recorded in `ParseResult::Matched::matched_by`.
    fn name(&self) -> &str;

    fn parse(&self, text: &str, legal_moves: &LegalMoveSet) -> ParseResult;
}
