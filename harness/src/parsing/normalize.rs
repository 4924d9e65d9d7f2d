//! Notation normalization and alias tables.
//!
//! Two layers:
//! - [`normalize_notation`] cleans a single move token (suffixes, castling
//!   zeros, unicode dashes). Applied to both the candidate and the canonical
//!   text before any comparison.
//! - [`rewrite_aliases`] rewrites whole responses so that alternate
//!   conventions ("Knight to f3", "♘f3", German `Sf3`, "castles kingside")
//!   become standard algebraic tokens the extraction rules can see.

use regex::Regex;
use std::sync::LazyLock;

/// Unicode chess figurines and symbol look-alikes, folded to ASCII.
const SYMBOL_ALIASES: &[(char, &str)] = &[
    ('♔', "K"),
    ('♕', "Q"),
    ('♖', "R"),
    ('♗', "B"),
    ('♘', "N"),
    ('♚', "K"),
    ('♛', "Q"),
    ('♜', "R"),
    ('♝', "B"),
    ('♞', "N"),
    ('×', "x"),
    ('–', "-"),
    ('—', "-"),
    ('‑', "-"),
    ('−', "-"),
    ('：', ":"),
    ('＝', "="),
];

/// English piece names to piece letters.
const PIECE_NAMES: &[(&str, &str)] = &[
    ("king", "K"),
    ("queen", "Q"),
    ("rook", "R"),
    ("bishop", "B"),
    ("knight", "N"),
];

/// German piece letters (Springer, Läufer, Turm, Dame) to English ones.
const GERMAN_PIECE_LETTERS: &[(&str, &str)] = &[("S", "N"), ("L", "B"), ("T", "R"), ("D", "Q")];

static SPOKEN_PIECE_MOVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(king|queen|rook|bishop|knight)\s+(?:to|on|moves\s+to|goes\s+to|(takes|captures)(?:\s+on)?)\s+([a-h][1-8])\b")
        .unwrap()
});

static SPOKEN_PAWN_MOVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpawn\s+(?:to\s+)?([a-h][1-8])\b").unwrap());

static SPOKEN_CASTLE_KINGSIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:castles?|castling)\s+(?:king\s*-?\s*side|short)\b|\bshort\s+castl\w*")
        .unwrap()
});

static SPOKEN_CASTLE_QUEENSIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:castles?|castling)\s+(?:queen\s*-?\s*side|long)\b|\blong\s+castl\w*")
        .unwrap()
});

static GERMAN_PIECE_MOVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([SLTD])([a-h]?[1-8]?[x:]?[a-h][1-8])\b").unwrap());

/// Fold unicode symbols into their ASCII equivalents.
pub fn fold_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match SYMBOL_ALIASES.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// Rewrite alternate move conventions in free text into algebraic tokens.
pub fn rewrite_aliases(text: &str) -> String {
    let folded = fold_symbols(text);

    let rewritten = SPOKEN_CASTLE_QUEENSIDE.replace_all(&folded, "O-O-O");
    let rewritten = SPOKEN_CASTLE_KINGSIDE.replace_all(&rewritten, "O-O");

    let rewritten = SPOKEN_PIECE_MOVE.replace_all(&rewritten, |caps: &regex::Captures| {
        let name = caps[1].to_ascii_lowercase();
        let letter = PIECE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, l)| *l)
            .unwrap_or("");
        let capture = if caps.get(2).is_some() { "x" } else { "" };
        format!("{letter}{capture}{}", &caps[3])
    });

    let rewritten = SPOKEN_PAWN_MOVE.replace_all(&rewritten, "$1");

    GERMAN_PIECE_MOVE
        .replace_all(&rewritten, |caps: &regex::Captures| {
            let letter = GERMAN_PIECE_LETTERS
                .iter()
                .find(|(de, _)| *de == &caps[1])
                .map(|(_, en)| *en)
                .unwrap_or("");
            format!("{letter}{}", caps[2].replace(':', "x"))
        })
        .into_owned()
}

/// Normalize one move token for exact comparison.
///
/// Strips surrounding punctuation, check/mate/annotation suffixes, promotion
/// `=` and whitespace, and unifies castling written with zeros or lowercase.
pub fn normalize_notation(token: &str) -> String {
    let folded = fold_symbols(token);
    let trimmed = folded
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
        .trim_matches('-');

    let mut s: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect();

    // surrounding-punctuation trim already ate the final '.'
    if let Some(stripped) = s.strip_suffix("e.p") {
        s = stripped.to_string();
    }
    while s.ends_with(['+', '#', '!', '?']) {
        s.pop();
    }

    unify_castling(&s)
}

fn unify_castling(s: &str) -> String {
    let upper: String = s
        .chars()
        .map(|c| if c == '0' || c == 'o' { 'O' } else { c })
        .collect();
    match upper.as_str() {
        "O-O-O" | "OOO" => "O-O-O".to_string(),
        "O-O" | "OO" => "O-O".to_string(),
        _ => s.to_string(),
    }
}

/// Key used by similarity scoring: normalized notation with capture markers
/// removed and uppercase file letters folded (`E4` -> `e4`).
pub fn similarity_key(token: &str) -> String {
    let normalized = normalize_notation(token);
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        let next = chars.get(i + 1).copied();
        let next_is_square = matches!(
            (next, chars.get(i + 2).copied()),
            (Some('a'..='h'), Some('1'..='8'))
        );
        match c {
            'x' | ':' if i > 0 && next_is_square => continue,
            'A'..='H' if matches!(next, Some('1'..='8')) => out.push(c.to_ascii_lowercase()),
            _ => out.push(c),
        }
    }
    out
}

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Normalized edit similarity in `[0, 1]`; 1.0 means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}
