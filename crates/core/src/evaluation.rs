//! Evaluation results - one persona's outcome for one prompt.

use crate::id::{PersonaId, PromptId};
use crate::transcript::{Score, Transcript};
use crate::{Generation, Time};
use serde::{Deserialize, Serialize};

/// Outcome of evaluating one prompt against one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Prompt under test
    pub prompt_id: PromptId,

    /// Persona it was tested against
    pub persona_id: PersonaId,

    /// Generation in which the evaluation ran
    pub generation: Generation,

    /// Scores or failure
    pub outcome: EvaluationOutcome,

    /// When the evaluation finished
    pub completed_at: Time,
}

/// Scored outcome or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// All collaborator calls succeeded
    Scored(ScoredOutcome),
    /// A collaborator call failed; the result is censored
    Failed {
        /// Why the evaluation could not produce scores
        reason: String,
    },
}

/// Scores and trace of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOutcome {
    /// Score before the conversation
    pub baseline: Score,
    /// Score after the conversation
    pub final_score: Score,
    /// `final_score.value - baseline.value`
    pub improvement: f64,
    /// The simulated conversation
    pub transcript: Transcript,
    /// Opaque trace data from the collaborators
    #[serde(default)]
    pub trace: serde_json::Value,
}

impl ScoredOutcome {
    /// Build a scored outcome, deriving the improvement.
    pub fn new(baseline: Score, final_score: Score, transcript: Transcript) -> Self {
        let improvement = final_score.value - baseline.value;
        Self {
            baseline,
            final_score,
            improvement,
            transcript,
            trace: serde_json::Value::Null,
        }
    }

    /// Improvement on a single criterion, if both scores carry it.
    pub fn criterion_improvement(&self, name: &str) -> Option<f64> {
        let before = self.baseline.criteria.get(name)?;
        let after = self.final_score.criteria.get(name)?;
        Some(after - before)
    }
}

impl EvaluationResult {
    /// Create a scored result.
    pub fn scored(
        prompt_id: PromptId,
        persona_id: PersonaId,
        generation: Generation,
        outcome: ScoredOutcome,
    ) -> Self {
        Self {
            prompt_id,
            persona_id,
            generation,
            outcome: EvaluationOutcome::Scored(outcome),
            completed_at: chrono::Utc::now(),
        }
    }

    /// Create a failed result.
    pub fn failed(
        prompt_id: PromptId,
        persona_id: PersonaId,
        generation: Generation,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            prompt_id,
            persona_id,
            generation,
            outcome: EvaluationOutcome::Failed {
                reason: reason.into(),
            },
            completed_at: chrono::Utc::now(),
        }
    }

    /// Whether the adapter could not produce a result.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Failed { .. })
    }

    /// Scored outcome, if any.
    pub fn scored_outcome(&self) -> Option<&ScoredOutcome> {
        match &self.outcome {
            EvaluationOutcome::Scored(outcome) => Some(outcome),
            EvaluationOutcome::Failed { .. } => None,
        }
    }

    /// Improvement, if scored.
    pub fn improvement(&self) -> Option<f64> {
        self.scored_outcome().map(|o| o.improvement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_is_final_minus_baseline() {
        let outcome = ScoredOutcome::new(
            Score::new(2.0).with_criterion("stay_calm", 1.0),
            Score::new(2.5).with_criterion("stay_calm", 2.0),
            Transcript::new(),
        );
        assert!((outcome.improvement - 0.5).abs() < 1e-12);
        assert_eq!(outcome.criterion_improvement("stay_calm"), Some(1.0));
        assert_eq!(outcome.criterion_improvement("ask_for_help"), None);
    }

    #[test]
    fn test_failed_result_has_no_scores() {
        let result = EvaluationResult::failed(PromptId::new(), "p1".into(), 0, "timeout");
        assert!(result.is_failed());
        assert!(result.improvement().is_none());
    }
}
