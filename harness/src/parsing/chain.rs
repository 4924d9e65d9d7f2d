//! First-match composition of parsers.

use std::sync::Arc;

use tracing::debug;

use super::{MoveParser, ParseResult, RuleBasedMoveParser, SoftMoveParser, UnmatchedReason};
use crate::legal_moves::LegalMoveSet;

/// Runs member parsers in order and returns the first `Matched`.
///
/// When every member fails, the last member's `Unmatched` is returned. An
/// empty chain returns `Unmatched { no_parsers }`.
#[derive(Clone, Default)]
pub struct ChainedMoveParser {
    parsers: Vec<Arc<dyn MoveParser>>,
}

impl std::fmt::Debug for ChainedMoveParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.parsers.iter().map(|p| p.name()).collect();
        f.debug_struct("ChainedMoveParser")
            .field("parsers", &names)
            .finish()
    }
}

impl ChainedMoveParser {
    pub const NAME: &'static str = "chain";

    pub fn new(parsers: Vec<Arc<dyn MoveParser>>) -> Self {
        Self { parsers }
    }

    /// Rule-based extraction followed by soft matching.
    pub fn standard(threshold: f64, ambiguity_margin: f64) -> Self {
        Self::new(vec![
            Arc::new(RuleBasedMoveParser::new()),
            Arc::new(SoftMoveParser::new(threshold, ambiguity_margin)),
        ])
    }

    pub fn push(mut self, parser: Arc<dyn MoveParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl MoveParser for ChainedMoveParser {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parse(&self, text: &str, legal_moves: &LegalMoveSet) -> ParseResult {
        let mut last = ParseResult::unmatched(UnmatchedReason::NoParsers);
        for parser in &self.parsers {
            let result = parser.parse(text, legal_moves);
            if result.is_matched() {
                return result;
            }
            debug!(parser = parser.name(), result = ?result, "parser did not match");
            last = result;
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal_moves::LegalMove;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Fakes ──

    struct FixedParser {
        name: &'static str,
        result: ParseResult,
        calls: AtomicUsize,
    }

    impl FixedParser {
        fn new(name: &'static str, result: ParseResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MoveParser for FixedParser {
        fn name(&self) -> &str {
            self.name
        }

        fn parse(&self, _text: &str, _legal_moves: &LegalMoveSet) -> ParseResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn legal() -> LegalMoveSet {
        LegalMoveSet::from_pairs([(1, "e4"), (2, "e5")]).unwrap()
    }

    // ── Tests ──

    #[test]
    fn test_empty_chain() {
        let chain = ChainedMoveParser::default();
        assert_eq!(
            chain.parse("e4", &legal()),
            ParseResult::unmatched(UnmatchedReason::NoParsers)
        );
    }

    #[test]
    fn test_first_match_short_circuits() {
        let a = FixedParser::new("a", ParseResult::matched(&LegalMove::new(1, "e4"), "a"));
        let b = FixedParser::new("b", ParseResult::matched(&LegalMove::new(2, "e5"), "b"));
        let chain = ChainedMoveParser::new(vec![a.clone() as Arc<dyn MoveParser>, b.clone()]);

        let result = chain.parse("whatever", &legal());
        assert_eq!(result.formal_id(), Some(1));
        assert_eq!(result.matched_by(), Some("a"));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[test]
    fn test_last_unmatched_reason_wins() {
        let a = FixedParser::new("a", ParseResult::unmatched(UnmatchedReason::NoRuleMatch));
        let b = FixedParser::new("b", ParseResult::unmatched(UnmatchedReason::Ambiguous));
        let chain = ChainedMoveParser::new(vec![a.clone() as Arc<dyn MoveParser>, b.clone()]);

        assert_eq!(
            chain.parse("whatever", &legal()),
            ParseResult::unmatched(UnmatchedReason::Ambiguous)
        );
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn test_single_member() {
        let chain = ChainedMoveParser::default().push(Arc::new(RuleBasedMoveParser::new()));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.parse("play e5", &legal()).formal_id(), Some(2));
    }

    #[test]
    fn test_standard_chain_falls_through_to_soft() {
        let legal = LegalMoveSet::from_pairs([(1, "Nf3"), (2, "d4")]).unwrap();
        let chain = ChainedMoveParser::standard(0.7, 0.05);

        let exact = chain.parse("Final Answer: Nf3", &legal);
        assert_eq!(exact.matched_by(), Some("rule_based"));

        let soft = chain.parse("Knight to f3", &legal);
        assert_eq!(soft.formal_id(), Some(1));
        assert_eq!(soft.matched_by(), Some("soft"));

        let ambiguous = ChainedMoveParser::standard(0.7, 0.05).parse(
            "Nd2",
            &LegalMoveSet::from_pairs([(1, "Nbd2"), (2, "Nfd2")]).unwrap(),
        );
        assert_eq!(
            ambiguous,
            ParseResult::unmatched(UnmatchedReason::Ambiguous)
        );
    }

    #[test]
    fn test_standard_chain_reads_numbered_and_prose_answers() {
        let chain = ChainedMoveParser::standard(0.7, 0.05);
        let legal = legal();

        let numbered = chain.parse("Final Answer: 1. e4", &legal);
        assert_eq!(numbered.formal_id(), Some(1));
        assert_eq!(numbered.matched_by(), Some("rule_based"));

        assert_eq!(chain.parse("Final Answer: 23... e5", &legal).formal_id(), Some(2));
        assert_eq!(chain.parse("Final Answer: I play e4", &legal).formal_id(), Some(1));

        let knights = LegalMoveSet::from_pairs([(1, "Nf3"), (2, "d4")]).unwrap();
        let spoken = chain.parse("Final Answer: 1. knight to f3", &knights);
        assert_eq!(spoken.formal_id(), Some(1));
    }
}
