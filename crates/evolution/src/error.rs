//! Error types for the evolution layer.

use crate::ConfigError;
use promptevo_core::{Generation, PromptId};

/// Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Violations of the population's structural invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PopulationError {
    /// The prompt id is already stored
    #[error("Duplicate prompt id: {0}")]
    DuplicateId(PromptId),

    /// No prompt with this id exists
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(PromptId),

    /// A parent id does not resolve to a stored prompt
    #[error("Prompt {child} names unknown parent {parent}")]
    UnknownParent {
        /// Prompt being inserted
        child: PromptId,
        /// Missing parent
        parent: PromptId,
    },

    /// A parent is not from a strictly earlier generation
    #[error("Parent {parent} (generation {parent_generation}) is not older than {child} (generation {child_generation})")]
    ParentNotEarlier {
        /// Prompt being inserted
        child: PromptId,
        /// Child generation
        child_generation: Generation,
        /// Offending parent
        parent: PromptId,
        /// Parent generation
        parent_generation: Generation,
    },

    /// Insertion would make generations decrease in creation order
    #[error("Prompt {id} has generation {generation}, behind the latest {latest}")]
    GenerationRegression {
        /// Prompt being inserted
        id: PromptId,
        /// Its generation
        generation: Generation,
        /// Latest generation stored
        latest: Generation,
    },

    /// A record already exists for this prompt and evaluation generation
    #[error("Prompt {prompt} already has a fitness record for generation {generation}")]
    DuplicateRecord {
        /// Prompt
        prompt: PromptId,
        /// Evaluation generation
        generation: Generation,
    },
}

/// Errors surfaced by the population manager.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Population invariant violated
    #[error("Population error: {0}")]
    Population(#[from] PopulationError),

    /// A generation was requested after the run terminated
    #[error("Optimization already terminated")]
    Terminal,
}
