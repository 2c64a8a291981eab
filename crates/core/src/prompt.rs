//! Prompt model - a candidate system instruction and its genealogy.

use crate::id::PromptId;
use crate::{Generation, Time};
use serde::{Deserialize, Serialize};

/// How a prompt came into existence, including its parent ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Initial prompt supplied at startup
    Seed,
    /// Revised from a single parent
    Mutation {
        /// Parent prompt
        parent: PromptId,
    },
    /// Blended from two parents
    Crossover {
        /// First parent
        first: PromptId,
        /// Second parent
        second: PromptId,
    },
    /// Copy of the fitter parent, minted when a generated child was rejected
    Clone {
        /// Parent prompt
        parent: PromptId,
    },
    /// Frontier member carried into the next generation to be re-tested
    Elite {
        /// Parent prompt
        parent: PromptId,
    },
}

impl Origin {
    /// Operator kind without parent ids.
    pub fn operator(&self) -> OperatorKind {
        match self {
            Origin::Seed => OperatorKind::Seed,
            Origin::Mutation { .. } => OperatorKind::Mutation,
            Origin::Crossover { .. } => OperatorKind::Crossover,
            Origin::Clone { .. } => OperatorKind::Clone,
            Origin::Elite { .. } => OperatorKind::Elite,
        }
    }

    /// Parent ids (0, 1 or 2).
    pub fn parents(&self) -> Vec<PromptId> {
        match *self {
            Origin::Seed => Vec::new(),
            Origin::Mutation { parent } | Origin::Clone { parent } | Origin::Elite { parent } => {
                vec![parent]
            }
            Origin::Crossover { first, second } => vec![first, second],
        }
    }
}

/// Operator that created a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    /// Initial prompt
    Seed,
    /// Mutation
    Mutation,
    /// Crossover
    Crossover,
    /// Validator fallback clone
    Clone,
    /// Frontier carry-over
    Elite,
}

impl OperatorKind {
    /// Single-letter tag used in lineage names.
    ///
    /// Clones and elites share `E`: both copy a parent's text unchanged.
    pub fn tag(&self) -> char {
        match self {
            OperatorKind::Seed => 'S',
            OperatorKind::Mutation => 'M',
            OperatorKind::Crossover => 'C',
            OperatorKind::Clone | OperatorKind::Elite => 'E',
        }
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorKind::Seed => write!(f, "seed"),
            OperatorKind::Mutation => write!(f, "mutation"),
            OperatorKind::Crossover => write!(f, "crossover"),
            OperatorKind::Clone => write!(f, "clone"),
            OperatorKind::Elite => write!(f, "elite"),
        }
    }
}

/// A candidate system instruction.
///
/// Prompts are immutable: fields are only readable, and evolution always
/// mints a new `Prompt` rather than editing an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    id: PromptId,
    generation: Generation,
    lineage: String,
    origin: Origin,
    text: String,
    created_at: Time,
}

impl Prompt {
    /// Create a generation-0 seed prompt.
    pub fn seed(lineage: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Origin::Seed, 0, lineage, text)
    }

    /// Create a prompt with an explicit origin and generation.
    pub fn new(
        origin: Origin,
        generation: Generation,
        lineage: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: PromptId::new(),
            generation,
            lineage: lineage.into(),
            origin,
            text: text.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Unique id.
    pub fn id(&self) -> PromptId {
        self.id
    }

    /// Generation this prompt belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Human-readable genealogy label.
    pub fn lineage(&self) -> &str {
        &self.lineage
    }

    /// Origin, including parent ids.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Operator that created this prompt.
    pub fn operator(&self) -> OperatorKind {
        self.origin.operator()
    }

    /// Parent ids.
    pub fn parents(&self) -> Vec<PromptId> {
        self.origin.parents()
    }

    /// Instruction text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Whether this is a seed prompt.
    pub fn is_seed(&self) -> bool {
        matches!(self.origin, Origin::Seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_prompt_has_no_parents() {
        let prompt = Prompt::seed("Genesis", "You are a helpful coach.");
        assert!(prompt.is_seed());
        assert_eq!(prompt.generation(), 0);
        assert!(prompt.parents().is_empty());
        assert_eq!(prompt.operator(), OperatorKind::Seed);
    }

    #[test]
    fn test_origin_parent_ids() {
        let a = PromptId::new();
        let b = PromptId::new();

        assert_eq!(Origin::Mutation { parent: a }.parents(), vec![a]);
        assert_eq!(Origin::Clone { parent: b }.parents(), vec![b]);
        assert_eq!(Origin::Elite { parent: a }.parents(), vec![a]);
        assert_eq!(Origin::Elite { parent: a }.operator().tag(), 'E');
        assert_eq!(Origin::Crossover { first: a, second: b }.parents(), vec![a, b]);
    }

    #[test]
    fn test_distinct_prompts_get_distinct_ids() {
        let a = Prompt::seed("A", "You are a coach.");
        let b = Prompt::seed("B", "You are a coach.");
        assert_ne!(a.id(), b.id());
    }
}
