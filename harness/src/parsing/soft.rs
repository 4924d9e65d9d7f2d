//! Similarity-based reconciliation of free text with the legal move set.
//!
//! The response is first rewritten through the alias tables in
//! [`normalize`](super::normalize), then the rule extractors pull candidates
//! out of the rewritten text. Each candidate is scored against every legal
//! move with normalized edit similarity over [`similarity_key`] forms.
//!
//! A candidate is accepted only when its best score clears `threshold` and
//! the runner-up is more than `ambiguity_margin` behind.

use tracing::debug;

use super::normalize::{rewrite_aliases, similarity, similarity_key};
use super::rules::{prioritized_candidates, DEFAULT_RULES};
use super::{MoveParser, ParseResult, UnmatchedReason};
use crate::legal_moves::{LegalMove, LegalMoveSet};

/// Default minimum similarity for acceptance.
pub const DEFAULT_THRESHOLD: f64 = 0.7;
/// Default minimum lead of the best score over the runner-up.
pub const DEFAULT_AMBIGUITY_MARGIN: f64 = 0.05;

/// Whole responses at most this long (and at most two words) are scored
/// directly when no extraction rule finds anything.
const MAX_BARE_TOKEN_CHARS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftMoveParser {
    pub threshold: f64,
    pub ambiguity_margin: f64,
}

impl Default for SoftMoveParser {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_AMBIGUITY_MARGIN)
    }
}

/// Score of one candidate against the whole legal set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CandidateScore<'a> {
    pub best: Option<(&'a LegalMove, f64)>,
    pub runner_up: f64,
}

impl SoftMoveParser {
    pub const NAME: &'static str = "soft";

    pub fn new(threshold: f64, ambiguity_margin: f64) -> Self {
        Self {
            threshold,
            ambiguity_margin,
        }
    }

    /// Candidates in the order they are scored.
    pub fn candidates(text: &str, legal_moves: &LegalMoveSet) -> Vec<String> {
        let rewritten = rewrite_aliases(text);
        let mut out: Vec<String> = prioritized_candidates(DEFAULT_RULES, &rewritten, legal_moves)
            .into_iter()
            .map(|(_, candidate)| candidate)
            .collect();

        if out.is_empty() {
            let trimmed = rewritten.trim();
            let words: Vec<&str> = trimmed.split_whitespace().collect();
            if !words.is_empty() && words.len() <= 2 && trimmed.chars().count() <= MAX_BARE_TOKEN_CHARS
            {
                out.push(words.concat());
            }
        }
        out
    }

    pub(crate) fn score<'a>(candidate: &str, legal_moves: &'a LegalMoveSet) -> CandidateScore<'a> {
        let key = similarity_key(candidate);
        let mut best: Option<(&LegalMove, f64)> = None;
        let mut runner_up = 0.0_f64;

        for m in legal_moves {
            let s = similarity(&key, &similarity_key(&m.text));
            match best {
                Some((_, b)) if s > b => {
                    runner_up = b;
                    best = Some((m, s));
                }
                Some(_) => runner_up = runner_up.max(s),
                None => best = Some((m, s)),
            }
        }
        CandidateScore { best, runner_up }
    }

    fn judge(&self, candidate: &str, legal_moves: &LegalMoveSet) -> ParseResult {
        let scored = Self::score(candidate, legal_moves);
        let Some((best, best_score)) = scored.best else {
            return ParseResult::unmatched(UnmatchedReason::BelowThreshold);
        };

        if best_score < self.threshold {
            return ParseResult::unmatched(UnmatchedReason::BelowThreshold);
        }
        if legal_moves.len() > 1 && scored.runner_up >= best_score - self.ambiguity_margin {
            debug!(
                candidate,
                best = %best.text,
                best_score,
                runner_up = scored.runner_up,
                "soft match ambiguous"
            );
            return ParseResult::unmatched(UnmatchedReason::Ambiguous);
        }

        debug!(candidate, formal_id = best.id, best_score, "soft match");
        ParseResult::matched(best, Self::NAME)
    }
}

impl MoveParser for SoftMoveParser {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parse(&self, text: &str, legal_moves: &LegalMoveSet) -> ParseResult {
        if legal_moves.is_empty() {
            return ParseResult::unmatched(UnmatchedReason::BelowThreshold);
        }

        for candidate in Self::candidates(text, legal_moves) {
            let result = self.judge(&candidate, legal_moves);
            match result.unmatched_reason() {
                Some(UnmatchedReason::BelowThreshold) => continue,
                _ => return result,
            }
        }
        ParseResult::unmatched(UnmatchedReason::BelowThreshold)
    }
}
