//! Rule-based move extraction.
//!
//! An ordered list of named extraction rules, most specific first. Each rule
//! is a plain function from text to candidate tokens in order of appearance,
//! so each one can be tested on its own.
//!
//! | Rule              | Example input                   | Candidate |
//! |-------------------|---------------------------------|-----------|
//! | `answer_marker`   | `Final Answer: 1. Nf3`          | `Nf3`     |
//! | `emphasis`        | `I'll go with **e4**`           | `e4`      |
//! | `castling`        | `0-0`, `castle queenside`       | `O-O`     |
//! | `promotion`       | `e8=Q`, `exd8Q`                 | `e8=Q`    |
//! | `piece_move`      | `Nbd2`, `Qxf7+`                 | `Nbd2`    |
//! | `pawn_move`       | `exd5`, `e4`                    | `e4`      |
//! | `coordinate_move` | `e2e4`, `e7e8q`                 | `e2e4`    |
//! | `legal_token`     | any canonical text as a token   | as-is     |
//!
//! The parser only ever accepts an exact match after normalization. Near
//! misses are left to [`SoftMoveParser`](super::SoftMoveParser).

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::normalize::{normalize_notation, rewrite_aliases};
use super::{MoveParser, ParseResult, UnmatchedReason};
use crate::legal_moves::{LegalMove, LegalMoveSet};

static ANSWER_MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:final\s+answer|answer|my\s+move|move)\s*[:=][ \t]*([^\n]+)").unwrap()
});

static MOVE_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*\.+\s*").unwrap());

static EMPHASIS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*\n]{1,12})\*\*|\[\[([^\]\n]{1,12})\]\]|`([^`\n]{1,12})`").unwrap()
});

static CASTLING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([O0o]-[O0o](?:-[O0o])?)\b").unwrap());

static CASTLING_KEYWORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcastl\w*\s+(king|queen)\s*-?\s*side\b|\b(short|long)\s+castl\w*").unwrap()
});

static PROMOTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:[a-h]x)?[a-h][18])\s*=?\s*([QRBN])\b[+#]?").unwrap());

static PIECE_MOVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[KQRBN][a-h]?[1-8]?x?[a-h][1-8]\b[+#]?").unwrap());

static PAWN_MOVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[a-h]x)?[a-h][1-8]\b[+#]?").unwrap());

static COORDINATE_MOVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-h][1-8][a-h][1-8][qrbn]?\b").unwrap());

/// A named, independently testable extraction step.
#[derive(Clone, Copy)]
pub struct ExtractionRule {
    pub name: &'static str,
    /// When an authoritative rule yields any candidate, later rules are not
    /// consulted even if none of its candidates is legal.
    pub authoritative: bool,
    pub extract: fn(&str, &LegalMoveSet) -> Vec<String>,
}

impl std::fmt::Debug for ExtractionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRule")
            .field("name", &self.name)
            .field("authoritative", &self.authoritative)
            .finish()
    }
}

/// Default rule order.
pub const DEFAULT_RULES: &[ExtractionRule] = &[
    ExtractionRule {
        name: "answer_marker",
        authoritative: true,
        extract: extract_answer_marker,
    },
    ExtractionRule {
        name: "emphasis",
        authoritative: false,
        extract: extract_emphasis,
    },
    ExtractionRule {
        name: "castling",
        authoritative: false,
        extract: extract_castling,
    },
    ExtractionRule {
        name: "promotion",
        authoritative: false,
        extract: extract_promotion,
    },
    ExtractionRule {
        name: "piece_move",
        authoritative: false,
        extract: extract_piece_move,
    },
    ExtractionRule {
        name: "pawn_move",
        authoritative: false,
        extract: extract_pawn_move,
    },
    ExtractionRule {
        name: "coordinate_move",
        authoritative: false,
        extract: extract_coordinate_move,
    },
    ExtractionRule {
        name: "legal_token",
        authoritative: false,
        extract: extract_legal_token,
    },
];

/// One candidate per marker line. The line may carry a move number
/// (`1. e4`, `23... e5`) or prose (`I play e4`, `knight to f3`), so aliases
/// are rewritten, the notation rules run over it, and the first candidate
/// naming a legal move wins.
pub fn extract_answer_marker(text: &str, legal: &LegalMoveSet) -> Vec<String> {
    ANSWER_MARKER_PATTERN
        .captures_iter(text)
        .filter_map(|c| answer_from_marker_line(&c[1], legal))
        .collect()
}

fn is_wrapper(c: char) -> bool {
    matches!(c, '*' | '`' | '[' | ']' | '(' | ')' | '"' | '\'' | ',' | '.' | ':' | ' ' | '\t')
}

fn answer_from_marker_line(line: &str, legal: &LegalMoveSet) -> Option<String> {
    let line = rewrite_aliases(line);
    let line = line.trim_start_matches(is_wrapper);
    let line = MOVE_NUMBER_PATTERN.replace(line, "");
    let line = line.trim_start_matches(is_wrapper);

    let first_token = line
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(is_wrapper))
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let extractors: [fn(&str, &LegalMoveSet) -> Vec<String>; 6] = [
        extract_castling,
        extract_promotion,
        extract_piece_move,
        extract_pawn_move,
        extract_coordinate_move,
        extract_legal_token,
    ];
    let notation: Vec<String> = extractors
        .iter()
        .flat_map(|extract| extract(line, legal))
        .collect();

    first_token
        .iter()
        .chain(notation.iter())
        .find(|c| !matches!(exact_match(c, legal), ExactMatch::None))
        .or_else(|| notation.first())
        .or(first_token.as_ref())
        .cloned()
}

pub fn extract_emphasis(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    EMPHASIS_PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn extract_castling(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    let mut found: Vec<(usize, String)> = CASTLING_PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect();

    for caps in CASTLING_KEYWORD_PATTERN.captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let side = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let token = if side == "queen" || side == "long" {
            "O-O-O"
        } else {
            "O-O"
        };
        found.push((start, token.to_string()));
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, token)| token).collect()
}

pub fn extract_promotion(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    PROMOTION_PATTERN
        .captures_iter(text)
        .map(|c| format!("{}={}", &c[1], &c[2]))
        .collect()
}

pub fn extract_piece_move(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    PIECE_MOVE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn extract_pawn_move(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    PAWN_MOVE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn extract_coordinate_move(text: &str, _legal: &LegalMoveSet) -> Vec<String> {
    COORDINATE_MOVE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Canonical texts that appear in `text` as whole tokens. `-` counts as part
/// of a token so `O-O` is not found inside `O-O-O`.
pub fn extract_legal_token(text: &str, legal: &LegalMoveSet) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for m in legal {
        if m.text.is_empty() {
            continue;
        }
        for (start, _) in text.match_indices(m.text.as_str()) {
            let end = start + m.text.len();
            let before_ok = text[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric() && c != '-');
            let after_ok = text[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '-');
            if before_ok && after_ok {
                found.push((start, m.text.clone()));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));
    found.into_iter().map(|(_, t)| t).collect()
}

/// Candidates in the order parsers should try them.
///
/// If an authoritative rule produced anything, only its candidates are
/// returned. Within a rule the last mention comes first; duplicates are
/// dropped keeping the first occurrence.
pub fn prioritized_candidates(
    rules: &[ExtractionRule],
    text: &str,
    legal_moves: &LegalMoveSet,
) -> Vec<(&'static str, String)> {
    let mut out: Vec<(&'static str, String)> = Vec::new();
    for rule in rules {
        let found = (rule.extract)(text, legal_moves);
        if found.is_empty() {
            continue;
        }
        if rule.authoritative {
            out.clear();
            push_unique(&mut out, rule.name, found);
            return out;
        }
        push_unique(&mut out, rule.name, found);
    }
    out
}

fn push_unique(out: &mut Vec<(&'static str, String)>, rule: &'static str, found: Vec<String>) {
    for candidate in found.into_iter().rev() {
        if !out.iter().any(|(_, c)| *c == candidate) {
            out.push((rule, candidate));
        }
    }
}

/// Outcome of matching one candidate against the legal set.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ExactMatch<'a> {
    Unique(&'a LegalMove),
    Ambiguous,
    None,
}

/// Exact comparison after normalization: case-sensitive first, then
/// case-insensitive if that identifies exactly one move.
pub(crate) fn exact_match<'a>(candidate: &str, legal_moves: &'a LegalMoveSet) -> ExactMatch<'a> {
    let normalized = normalize_notation(candidate);
    if normalized.is_empty() {
        return ExactMatch::None;
    }

    let keyed: Vec<(&LegalMove, String)> = legal_moves
        .iter()
        .map(|m| (m, normalize_notation(&m.text)))
        .collect();

    let sensitive: Vec<&LegalMove> = keyed
        .iter()
        .filter(|(_, k)| *k == normalized)
        .map(|(m, _)| *m)
        .collect();
    match sensitive.len() {
        1 => return ExactMatch::Unique(sensitive[0]),
        n if n > 1 => return ExactMatch::Ambiguous,
        _ => {}
    }

    let insensitive: Vec<&LegalMove> = keyed
        .iter()
        .filter(|(_, k)| k.eq_ignore_ascii_case(&normalized))
        .map(|(m, _)| *m)
        .collect();
    match insensitive.len() {
        0 => ExactMatch::None,
        1 => ExactMatch::Unique(insensitive[0]),
        _ => ExactMatch::Ambiguous,
    }
}

/// Extracts candidates with [`DEFAULT_RULES`] and accepts only exact matches.
#[derive(Debug, Clone)]
pub struct RuleBasedMoveParser {
    rules: Vec<ExtractionRule>,
}

impl Default for RuleBasedMoveParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedMoveParser {
    pub const NAME: &'static str = "rule_based";

    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }

    /// Use a custom rule list (order is priority).
    pub fn with_rules(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }
}

impl MoveParser for RuleBasedMoveParser {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parse(&self, text: &str, legal_moves: &LegalMoveSet) -> ParseResult {
        for (rule, candidate) in prioritized_candidates(&self.rules, text, legal_moves) {
            match exact_match(&candidate, legal_moves) {
                ExactMatch::Unique(m) => {
                    debug!(rule, candidate = %candidate, formal_id = m.id, "rule match");
                    return ParseResult::matched(m, Self::NAME);
                }
                ExactMatch::Ambiguous => {
                    debug!(rule, candidate = %candidate, "candidate matches several legal moves");
                }
                ExactMatch::None => {}
            }
        }
        ParseResult::unmatched(UnmatchedReason::NoRuleMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chess_moves() -> LegalMoveSet {
        LegalMoveSet::from_pairs([
            (1, "e4"),
            (2, "d4"),
            (3, "Nf3"),
            (4, "Nbd2"),
            (5, "O-O"),
            (6, "exd5"),
            (7, "e8=Q+"),
            (8, "Bxc3"),
            (9, "bxc3"),
        ])
        .unwrap()
    }

    fn empty() -> LegalMoveSet {
        LegalMoveSet::default()
    }

    #[test]
    fn test_answer_marker_rule() {
        assert_eq!(
            extract_answer_marker("Thinking...\nFinal Answer: **Nf3**", &empty()),
            vec!["Nf3"]
        );
        assert_eq!(extract_answer_marker("Move: e4.", &empty()), vec!["e4"]);
    }

    #[test]
    fn test_answer_marker_skips_move_numbers_and_prose() {
        let legal = LegalMoveSet::from_pairs([(1, "e4"), (2, "e5")]).unwrap();
        assert_eq!(extract_answer_marker("Final Answer: 1. e4", &legal), vec!["e4"]);
        assert_eq!(extract_answer_marker("Final Answer: 23... e5", &legal), vec!["e5"]);
        assert_eq!(extract_answer_marker("Final Answer: 1.e4", &legal), vec!["e4"]);
        assert_eq!(extract_answer_marker("Final Answer: I play e4", &legal), vec!["e4"]);
        // Not legal, but still the stated move for the soft parser to judge.
        assert_eq!(
            extract_answer_marker("Final Answer: I play Nd2", &legal),
            vec!["Nd2"]
        );
    }

    #[test]
    fn test_answer_marker_line_forms_parse() {
        let parser = RuleBasedMoveParser::new();
        let legal = LegalMoveSet::from_pairs([(1, "e4"), (2, "e5")]).unwrap();
        for (text, id) in [
            ("Final Answer: 1. e4", 1),
            ("Thinking about d4 and c4.\nFinal Answer: 23... e5", 2),
            ("Final Answer: I play e4", 1),
            ("Final Answer: **1. e4**", 1),
        ] {
            assert_eq!(parser.parse(text, &legal).formal_id(), Some(id), "{text}");
        }

        // Spoken piece move must not collapse onto a legal pawn move.
        let legal = LegalMoveSet::from_pairs([(1, "f3"), (2, "Nf3")]).unwrap();
        for (text, id) in [
            ("Final Answer: knight to f3", 2),
            ("Final Answer: 5. f3", 1),
        ] {
            assert_eq!(parser.parse(text, &legal).formal_id(), Some(id), "{text}");
        }
    }

    #[test]
    fn test_emphasis_rule() {
        assert_eq!(
            extract_emphasis("I choose **e4** or [[d4]] or `Nf3`", &empty()),
            vec!["e4", "d4", "Nf3"]
        );
    }

    #[test]
    fn test_castling_rule() {
        assert_eq!(extract_castling("I'll play 0-0 now", &empty()), vec!["0-0"]);
        assert_eq!(extract_castling("O-O-O is best", &empty()), vec!["O-O-O"]);
        assert_eq!(
            extract_castling("castle kingside, not long castling", &empty()),
            vec!["O-O", "O-O-O"]
        );
    }

    #[test]
    fn test_promotion_rule() {
        assert_eq!(extract_promotion("push e8=Q!", &empty()), vec!["e8=Q"]);
        assert_eq!(extract_promotion("dxe8N", &empty()), vec!["dxe8=N"]);
    }

    #[test]
    fn test_notation_rules() {
        assert_eq!(
            extract_piece_move("Nbd2 then Qxf7+", &empty()),
            vec!["Nbd2", "Qxf7+"]
        );
        assert_eq!(extract_pawn_move("exd5 and e4", &empty()), vec!["exd5", "e4"]);
        assert!(extract_pawn_move("Nf3", &empty()).is_empty());
        assert_eq!(extract_coordinate_move("uci e2e4", &empty()), vec!["e2e4"]);
        assert!(extract_pawn_move("e2e4", &empty()).is_empty());
    }

    #[test]
    fn test_legal_token_rule_respects_boundaries() {
        let legal = LegalMoveSet::from_pairs([(1, "a1"), (2, "pass")]).unwrap();
        assert_eq!(extract_legal_token("I pass on a1", &legal), vec!["pass", "a1"]);
        assert!(extract_legal_token("passing a12", &legal).is_empty());

        let castles = LegalMoveSet::from_pairs([(1, "O-O")]).unwrap();
        assert!(extract_legal_token("**O-O-O**", &castles).is_empty());
    }

    #[test]
    fn test_parse_end_to_end_example() {
        let legal = LegalMoveSet::from_pairs([(1, "e4"), (2, "e5")]).unwrap();
        let result = RuleBasedMoveParser::new().parse("I will play e4.", &legal);
        assert_eq!(result.formal_id(), Some(1));
        assert_eq!(result.matched_by(), Some("rule_based"));
    }

    #[test]
    fn test_normalized_exact_matches() {
        let parser = RuleBasedMoveParser::new();
        let legal = chess_moves();
        assert_eq!(parser.parse("Castling: 0-0", &legal).formal_id(), Some(5));
        assert_eq!(parser.parse("I promote with e8=Q", &legal).formal_id(), Some(7));
        assert_eq!(parser.parse("Nf3+ develops", &legal).formal_id(), Some(3));
        assert_eq!(parser.parse("bxc3 recaptures", &legal).formal_id(), Some(9));
        assert_eq!(parser.parse("Bxc3 trades", &legal).formal_id(), Some(8));
    }

    #[test]
    fn test_last_mention_wins() {
        let parser = RuleBasedMoveParser::new();
        let result = parser.parse("d4 is fine, but I prefer e4", &chess_moves());
        assert_eq!(result.formal_id(), Some(1));
    }

    #[test]
    fn test_answer_marker_is_authoritative() {
        let parser = RuleBasedMoveParser::new();
        // Nf6 is not legal; e4 mentioned in passing must not be picked.
        let result = parser.parse("e4 was considered.\nFinal Answer: Nf6", &chess_moves());
        assert_eq!(
            result,
            ParseResult::unmatched(UnmatchedReason::NoRuleMatch)
        );
    }

    #[test]
    fn test_near_miss_is_not_guessed() {
        let parser = RuleBasedMoveParser::new();
        let result = parser.parse("I play Nd2", &chess_moves());
        assert_eq!(
            result,
            ParseResult::unmatched(UnmatchedReason::NoRuleMatch)
        );
    }

    #[test]
    fn test_case_insensitive_needs_unique_hit() {
        let legal = chess_moves();
        assert_eq!(exact_match("NF3", &legal), ExactMatch::Unique(legal.get(3).unwrap()));
        assert_eq!(exact_match("BXC3", &legal), ExactMatch::Ambiguous);
    }

    #[test]
    fn test_deterministic() {
        let parser = RuleBasedMoveParser::new();
        let legal = chess_moves();
        let text = "Maybe Nf3, maybe d4. **d4**";
        let first = parser.parse(text, &legal);
        for _ in 0..10 {
            assert_eq!(parser.parse(text, &legal), first);
        }
    }
}
