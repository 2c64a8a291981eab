//! Evaluator adapter - one prompt against one persona.

use async_trait::async_trait;
use promptevo_collab::{CallError, CallGate, DialogueSimulator, Scorer};
use promptevo_core::{EvaluationResult, Generation, Persona, Prompt, Score, ScoredOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// Evaluates a prompt against a persona.
///
/// Implementations never fail: collaborator problems are reported as a
/// failed [`EvaluationResult`].
#[async_trait]
pub trait EvaluationAdapter: Send + Sync {
    /// Evaluate `prompt` with `persona` as part of `generation`.
    async fn evaluate(
        &self,
        prompt: &Prompt,
        persona: &Persona,
        generation: Generation,
    ) -> EvaluationResult;
}

/// Adapter backed by the dialogue and scoring collaborators.
///
/// Runs baseline score → simulated conversation → post score, each call
/// through the shared gate.
pub struct CollaboratorEvaluator {
    simulator: Arc<dyn DialogueSimulator>,
    scorer: Arc<dyn Scorer>,
    gate: CallGate,
    turn_budget: usize,
}

impl CollaboratorEvaluator {
    /// Create an evaluator.
    pub fn new(
        simulator: Arc<dyn DialogueSimulator>,
        scorer: Arc<dyn Scorer>,
        gate: CallGate,
        turn_budget: usize,
    ) -> Self {
        Self {
            simulator,
            scorer,
            gate,
            turn_budget,
        }
    }

    async fn run(&self, prompt: &Prompt, persona: &Persona) -> Result<ScoredOutcome, CallError> {
        let label = format!("baseline score for {}", persona.id);
        let baseline = self
            .gate
            .call(&label, || self.scorer.score(persona, None))
            .await?;
        check_score(&label, &baseline)?;

        let label = format!("dialogue with {}", persona.id);
        let transcript = self
            .gate
            .call(&label, || {
                self.simulator
                    .simulate(prompt.text(), persona, self.turn_budget)
            })
            .await?;

        let label = format!("post score for {}", persona.id);
        let final_score = self
            .gate
            .call(&label, || self.scorer.score(persona, Some(&transcript)))
            .await?;
        check_score(&label, &final_score)?;

        let turns = transcript.len();
        let mut outcome = ScoredOutcome::new(baseline, final_score, transcript);
        outcome.trace = serde_json::json!({
            "persona": persona.name,
            "turn_budget": self.turn_budget,
            "turns": turns,
        });
        Ok(outcome)
    }
}

/// Reject non-finite overall or per-criterion values.
fn check_score(label: &str, score: &Score) -> Result<(), CallError> {
    let malformed = |message: String| CallError::Failed {
        label: label.to_string(),
        attempts: 1,
        message,
    };

    if !score.value.is_finite() {
        return Err(malformed(format!("malformed score {}", score.value)));
    }
    match score.criteria.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => Err(malformed(format!("malformed criterion {} = {}", name, value))),
        None => Ok(()),
    }
}

#[async_trait]
impl EvaluationAdapter for CollaboratorEvaluator {
    async fn evaluate(
        &self,
        prompt: &Prompt,
        persona: &Persona,
        generation: Generation,
    ) -> EvaluationResult {
        match self.run(prompt, persona).await {
            Ok(outcome) => {
                debug!(
                    "{} with {}: {:+.3}",
                    prompt.lineage(),
                    persona.id,
                    outcome.improvement
                );
                EvaluationResult::scored(prompt.id(), persona.id.clone(), generation, outcome)
            }
            Err(e) => {
                warn!("Evaluation of {} with {} failed: {}", prompt.lineage(), persona.id, e);
                EvaluationResult::failed(prompt.id(), persona.id.clone(), generation, e.to_string())
            }
        }
    }
}
