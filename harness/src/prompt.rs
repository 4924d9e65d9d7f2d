//! Prompt rendering collaborator.
//!
//! Rendering is deterministic: the same observation, configuration and
//! feedback always produce the same prompt.

use std::fmt::Write as _;

use crate::observation::{GameConfiguration, Observation};
use crate::sampling::Feedback;

pub trait PromptBuilder: Send + Sync {
    fn build(
        &self,
        observation: &Observation,
        configuration: &GameConfiguration,
        feedback: Option<&Feedback>,
    ) -> String;
}

/// Plain-text template asking for a `Final Answer: <move>` line.
#[derive(Debug, Clone)]
pub struct DefaultPromptBuilder {
    /// List the legal moves in the first prompt, not only in feedback.
    pub list_legal_moves: bool,
    /// Show at most this many trailing moves of history.
    pub max_history: usize,
}

impl Default for DefaultPromptBuilder {
    fn default() -> Self {
        Self {
            list_legal_moves: true,
            max_history: 20,
        }
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build(
        &self,
        observation: &Observation,
        configuration: &GameConfiguration,
        feedback: Option<&Feedback>,
    ) -> String {
        let game = if configuration.game.is_empty() {
            "a board game"
        } else {
            configuration.game.as_str()
        };

        let mut out = String::new();
        let _ = writeln!(out, "You are playing {game}.");
        if let Some(player) = &observation.player {
            let _ = writeln!(out, "You are {player}.");
        }
        let _ = writeln!(out, "\nCurrent state:\n{}", observation.state.trim_end());

        if !observation.history.is_empty() {
            let skip = observation.history.len().saturating_sub(self.max_history);
            let recent: Vec<&str> = observation.history[skip..]
                .iter()
                .map(String::as_str)
                .collect();
            let _ = writeln!(out, "\nMoves so far: {}", recent.join(" "));
        }

        if self.list_legal_moves {
            let _ = writeln!(
                out,
                "\nLegal moves: {}",
                observation.legal_moves.texts().join(", ")
            );
        }

        if let Some(fb) = feedback {
            let _ = writeln!(
                out,
                "\nYour previous answer could not be used ({}):\n---\n{}\n---\nPick exactly one of these legal moves: {}",
                fb.reason,
                fb.previous_text.trim(),
                fb.legal_moves.join(", ")
            );
        }

        out.push_str(
            "\nThink briefly, then end your reply with a single line of the form\n\
             Final Answer: <move>",
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal_moves::LegalMoveSet;
    use crate::parsing::UnmatchedReason;

    fn observation() -> Observation {
        Observation::new(
            "8/8/8/8/8/8/4P3/4K3 w - - 0 1",
            LegalMoveSet::from_pairs([(1, "e3"), (2, "e4"), (3, "Kd1")]).unwrap(),
        )
        .with_player("white")
    }

    #[test]
    fn test_first_prompt() {
        let prompt = DefaultPromptBuilder::default().build(
            &observation(),
            &GameConfiguration::new("chess"),
            None,
        );
        assert!(prompt.starts_with("You are playing chess."));
        assert!(prompt.contains("You are white."));
        assert!(prompt.contains("Legal moves: e3, e4, Kd1"));
        assert!(prompt.ends_with("Final Answer: <move>"));
        assert!(!prompt.contains("previous answer"));
    }

    #[test]
    fn test_feedback_folded_in() {
        let obs = observation();
        let fb = Feedback::new("I play e5", UnmatchedReason::NoRuleMatch, &obs.legal_moves);
        let builder = DefaultPromptBuilder {
            list_legal_moves: false,
            ..Default::default()
        };
        let prompt = builder.build(&obs, &GameConfiguration::new("chess"), Some(&fb));
        assert!(prompt.contains("could not be used (no_rule_match)"));
        assert!(prompt.contains("---\nI play e5\n---"));
        assert!(prompt.contains("Pick exactly one of these legal moves: e3, e4, Kd1"));
        assert!(!prompt.contains("Legal moves:"));
    }

    #[test]
    fn test_history_is_truncated() {
        let obs = observation().with_history((1..=30).map(|i| format!("m{i}")).collect());
        let builder = DefaultPromptBuilder {
            max_history: 3,
            ..Default::default()
        };
        let prompt = builder.build(&obs, &GameConfiguration::default(), None);
        assert!(prompt.contains("You are playing a board game."));
        assert!(prompt.contains("Moves so far: m28 m29 m30"));
    }

    #[test]
    fn test_deterministic() {
        let obs = observation();
        let fb = Feedback::new("??", UnmatchedReason::Ambiguous, &obs.legal_moves);
        let cfg = GameConfiguration::new("chess");
        let builder = DefaultPromptBuilder::default();
        assert_eq!(
            builder.build(&obs, &cfg, Some(&fb)),
            builder.build(&obs, &cfg, Some(&fb))
        );
    }
}
