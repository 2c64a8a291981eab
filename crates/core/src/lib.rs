//! promptevo core data models.
//!
//! This crate defines the records that flow through the prompt optimizer:
//! candidate prompts and their genealogy, personas, evaluation outcomes,
//! fitness aggregates and the free-text notes produced by reflection.

#![warn(missing_docs)]

// Core identities
mod id;

// Candidates
mod prompt;
mod persona;

// Evaluation
mod transcript;
mod evaluation;
mod objective;
mod fitness;

// Reflection
mod note;

// Re-exports
pub use id::*;

pub use prompt::{Prompt, Origin, OperatorKind};
pub use persona::Persona;

pub use transcript::{Transcript, Turn, Speaker, Score};
pub use evaluation::{EvaluationResult, EvaluationOutcome, ScoredOutcome};
pub use objective::Objective;
pub use fitness::FitnessRecord;

pub use note::{ReflectionNote, SynthesisNote, NoteLog, NO_ANALYSIS};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Generation number. Seeds live in generation 0.
pub type Generation = u32;
