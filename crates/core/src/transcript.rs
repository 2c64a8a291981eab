//! Dialogue transcripts and questionnaire scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The instruction under test
    Coach,
    /// The simulated persona
    Persona,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::Coach => write!(f, "Coach"),
            Speaker::Persona => write!(f, "Persona"),
        }
    }
}

/// A single exchange turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker
    pub speaker: Speaker,
    /// Message text
    pub message: String,
}

/// A simulated conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Ordered turns
    pub turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, speaker: Speaker, message: impl Into<String>) {
        self.turns.push(Turn {
            speaker,
            message: message.into(),
        });
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as `Speaker: message` lines, cut at `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let line = format!("{}: {}\n", turn.speaker, turn.message);
            out.push_str(&line);
            if out.chars().count() > max_chars {
                let mut cut: String = out.chars().take(max_chars).collect();
                cut.push_str("\n[transcript truncated]");
                return cut;
            }
        }
        out
    }
}

/// A questionnaire score returned by the scoring collaborator.
///
/// `value` is the overall self-assessment; `criteria` optionally breaks it
/// down per questionnaire item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Overall score
    pub value: f64,
    /// Per-criterion scores
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

impl Score {
    /// Create an overall-only score.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            criteria: BTreeMap::new(),
        }
    }

    /// Add a per-criterion score.
    pub fn with_criterion(mut self, name: impl Into<String>, value: f64) -> Self {
        self.criteria.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_transcript() {
        let mut transcript = Transcript::new();
        transcript.push(Speaker::Coach, "Hi, how are you?");
        transcript.push(Speaker::Persona, "Nervous.");

        let text = transcript.render(1000);
        assert_eq!(text, "Coach: Hi, how are you?\nPersona: Nervous.\n");
    }

    #[test]
    fn test_render_truncates() {
        let mut transcript = Transcript::new();
        for _ in 0..20 {
            transcript.push(Speaker::Persona, "a fairly long message about feelings");
        }

        let text = transcript.render(50);
        assert!(text.ends_with("[transcript truncated]"));
        assert!(text.chars().count() < 100);
    }
}
