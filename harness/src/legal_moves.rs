//! Legal move vocabulary for a single decision point.
//!
//! The game engine enumerates the legal moves; this crate never generates
//! them. A [`LegalMoveSet`] is built once per decision and shared read-only
//! by every parser and sampler working on that decision.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Engine-defined integer identifying a move, independent of notation.
pub type ActionId = i64;

/// One legal move: the engine's formal id plus its canonical notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegalMove {
    /// Formal action id.
    pub id: ActionId,
    /// Canonical move text as enumerated by the engine (e.g. `"Nf3"`).
    pub text: String,
}

impl LegalMove {
    pub fn new(id: ActionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Error type for legal move set construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LegalMoveError {
    #[error("Duplicate action id {0} in legal move set")]
    DuplicateId(ActionId),
}

/// Ordered, immutable set of legal moves with unique ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<LegalMove>", into = "Vec<LegalMove>")]
pub struct LegalMoveSet {
    moves: Vec<LegalMove>,
}

impl LegalMoveSet {
    /// Build a set, rejecting duplicate action ids. Order is preserved.
    pub fn new(moves: Vec<LegalMove>) -> Result<Self, LegalMoveError> {
        let mut seen = HashSet::with_capacity(moves.len());
        for m in &moves {
            if !seen.insert(m.id) {
                return Err(LegalMoveError::DuplicateId(m.id));
            }
        }
        Ok(Self { moves })
    }

    /// Convenience constructor from `(id, text)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, LegalMoveError>
    where
        I: IntoIterator<Item = (ActionId, S)>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(id, text)| LegalMove::new(id, text))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LegalMove> {
        self.moves.iter()
    }

    pub fn as_slice(&self) -> &[LegalMove] {
        &self.moves
    }

    /// Look up a move by its formal id.
    pub fn get(&self, id: ActionId) -> Option<&LegalMove> {
        self.moves.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.get(id).is_some()
    }

    /// Position of `id` in enumeration order.
    pub fn position(&self, id: ActionId) -> Option<usize> {
        self.moves.iter().position(|m| m.id == id)
    }

    /// All moves whose canonical text equals `text` exactly.
    pub fn find_text<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a LegalMove> + 'a {
        self.moves.iter().filter(move |m| m.text == text)
    }

    /// Canonical texts in enumeration order.
    pub fn texts(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.text.clone()).collect()
    }
}

impl TryFrom<Vec<LegalMove>> for LegalMoveSet {
    type Error = LegalMoveError;

    fn try_from(moves: Vec<LegalMove>) -> Result<Self, Self::Error> {
        Self::new(moves)
    }
}

impl From<LegalMoveSet> for Vec<LegalMove> {
    fn from(set: LegalMoveSet) -> Self {
        set.moves
    }
}

impl<'a> IntoIterator for &'a LegalMoveSet {
    type Item = &'a LegalMove;
    type IntoIter = std::slice::Iter<'a, LegalMove>;

    fn into_iter(self) -> Self::IntoIter {
        self.moves.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_rejected() {
        let err = LegalMoveSet::from_pairs([(1, "e4"), (1, "d4")]).unwrap_err();
        assert_eq!(err, LegalMoveError::DuplicateId(1));
    }

    #[test]
    fn test_lookup_preserves_order() {
        let set = LegalMoveSet::from_pairs([(7, "Nf3"), (3, "e4"), (9, "d4")]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(3).unwrap().text, "e4");
        assert_eq!(set.position(9), Some(2));
        assert!(!set.contains(4));
        assert_eq!(set.texts(), vec!["Nf3", "e4", "d4"]);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: LegalMoveSet =
            serde_json::from_str(r#"[{"id": 1, "text": "e4"}, {"id": 2, "text": "e5"}]"#).unwrap();
        assert_eq!(ok.find_text("e5").next().unwrap().id, 2);

        let dup = serde_json::from_str::<LegalMoveSet>(
            r#"[{"id": 1, "text": "e4"}, {"id": 1, "text": "e5"}]"#,
        );
        assert!(dup.is_err());
    }
}
