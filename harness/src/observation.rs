//! What the game engine hands the agent at each decision point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::legal_moves::LegalMoveSet;

/// One decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Natural-language or notation description of the position
    /// (e.g. a FEN string plus board diagram).
    pub state: String,
    pub legal_moves: LegalMoveSet,
    /// Name or index of the player to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    /// Moves played so far, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
}

impl Observation {
    pub fn new(state: impl Into<String>, legal_moves: LegalMoveSet) -> Self {
        Self {
            state: state.into(),
            legal_moves,
            player: None,
            history: Vec::new(),
        }
    }

    pub fn with_player(mut self, player: impl Into<String>) -> Self {
        self.player = Some(player.into());
        self
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }
}

/// Static description of the game being played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameConfiguration {
    /// Game name shown to the model (e.g. `"chess"`).
    pub game: String,
    /// Engine-specific options passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl GameConfiguration {
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            extra: BTreeMap::new(),
        }
    }
}
