//! Collaborator abstractions.

use async_trait::async_trait;
use promptevo_core::{Persona, Score, Transcript};
use std::sync::Arc;

/// Simulates a coaching conversation.
///
/// Implementations may fail or hang; callers wrap them in a timeout. A call
/// must be safe to retry.
#[async_trait]
pub trait DialogueSimulator: Send + Sync {
    /// Run `turn_budget` exchanges with `system_instruction` as the coach's
    /// system prompt and `persona` as the counterpart.
    async fn simulate(
        &self,
        system_instruction: &str,
        persona: &Persona,
        turn_budget: usize,
    ) -> Result<Transcript, anyhow::Error>;
}

/// Administers the self-assessment questionnaire.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score `persona`. `None` means the baseline assessment before any
    /// conversation took place.
    async fn score(
        &self,
        persona: &Persona,
        transcript: Option<&Transcript>,
    ) -> Result<Score, anyhow::Error>;
}

/// Free-text language generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a text response to `request`.
    async fn generate(&self, request: &str) -> Result<String, anyhow::Error>;
}

/// The three collaborators the optimizer needs.
#[derive(Clone)]
pub struct Collaborators {
    /// Dialogue simulation
    pub simulator: Arc<dyn DialogueSimulator>,
    /// Questionnaire scoring
    pub scorer: Arc<dyn Scorer>,
    /// Reflection, synthesis, mutation and crossover text
    pub generator: Arc<dyn TextGenerator>,
}

impl Collaborators {
    /// Bundle collaborators.
    pub fn new(
        simulator: Arc<dyn DialogueSimulator>,
        scorer: Arc<dyn Scorer>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            simulator,
            scorer,
            generator,
        }
    }
}
