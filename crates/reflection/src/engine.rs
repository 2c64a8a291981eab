//! Reflection engine - turns evaluation outcomes into advisory notes.

use crate::request::{reflection_request, synthesis_request};
use futures::future::join_all;
use promptevo_collab::{CallError, CallGate, TextGenerator};
use promptevo_core::{
    EvaluationOutcome, EvaluationResult, Prompt, ReflectionNote, SynthesisNote,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the reflection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Write a critique per conversation before the synthesis
    pub reflect_per_persona: bool,
    /// Character budget for a transcript inside a request
    pub max_transcript_chars: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            reflect_per_persona: true,
            max_transcript_chars: 6000,
        }
    }
}

impl ReflectionConfig {
    /// Enable or disable per-persona reflections.
    pub fn with_reflect_per_persona(mut self, enabled: bool) -> Self {
        self.reflect_per_persona = enabled;
        self
    }

    /// Set the transcript character budget.
    pub fn with_max_transcript_chars(mut self, chars: usize) -> Self {
        self.max_transcript_chars = chars;
        self
    }
}

/// Notes produced for one prompt's panel.
#[derive(Debug, Clone)]
pub struct PanelReview {
    /// Per-persona reflections, in evaluation order
    pub reflections: Vec<ReflectionNote>,
    /// Cross-persona synthesis
    pub synthesis: SynthesisNote,
}

impl PanelReview {
    /// Notes that fell back to the placeholder.
    pub fn degraded(&self) -> usize {
        self.reflections.iter().filter(|n| n.degraded).count() + usize::from(self.synthesis.degraded)
    }
}

/// Generates reflections from evaluation outcomes.
///
/// The engine never fails: when the text generator is unavailable a
/// placeholder note flagged as degraded is returned instead.
pub struct ReflectionEngine {
    generator: Arc<dyn TextGenerator>,
    gate: CallGate,
    config: ReflectionConfig,
}

impl ReflectionEngine {
    /// Create a new reflection engine.
    pub fn new(generator: Arc<dyn TextGenerator>, gate: CallGate) -> Self {
        Self {
            generator,
            gate,
            config: ReflectionConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReflectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// Critique one conversation.
    ///
    /// Failed evaluations get a placeholder without a collaborator call.
    pub async fn reflect(&self, prompt: &Prompt, evaluation: &EvaluationResult) -> ReflectionNote {
        let outcome = match &evaluation.outcome {
            EvaluationOutcome::Scored(outcome) => outcome,
            EvaluationOutcome::Failed { reason } => {
                debug!(
                    "No reflection for {} with {}: {}",
                    prompt.lineage(),
                    evaluation.persona_id,
                    reason
                );
                return ReflectionNote::placeholder(
                    prompt.id(),
                    evaluation.persona_id.clone(),
                    evaluation.generation,
                );
            }
        };

        let request = reflection_request(
            prompt,
            outcome,
            evaluation.persona_id.as_str(),
            self.config.max_transcript_chars,
        );
        let label = format!("reflection on {} with {}", prompt.lineage(), evaluation.persona_id);

        match self.ask(&label, &request).await {
            Ok(text) => ReflectionNote::new(
                prompt.id(),
                evaluation.persona_id.clone(),
                evaluation.generation,
                text,
            ),
            Err(e) => {
                warn!("Reflection degraded: {}", e);
                ReflectionNote::placeholder(
                    prompt.id(),
                    evaluation.persona_id.clone(),
                    evaluation.generation,
                )
            }
        }
    }

    /// Critique every conversation of a panel concurrently.
    ///
    /// Returns nothing when per-persona reflection is disabled.
    pub async fn reflect_panel(
        &self,
        prompt: &Prompt,
        evaluations: &[EvaluationResult],
    ) -> Vec<ReflectionNote> {
        if !self.config.reflect_per_persona {
            return Vec::new();
        }
        join_all(evaluations.iter().map(|e| self.reflect(prompt, e))).await
    }

    /// Summarise a panel.
    ///
    /// A panel with no scored evaluation gets a placeholder without a
    /// collaborator call.
    pub async fn synthesize(
        &self,
        prompt: &Prompt,
        evaluations: &[EvaluationResult],
        reflections: &[ReflectionNote],
    ) -> SynthesisNote {
        let generation = evaluations
            .iter()
            .map(|e| e.generation)
            .max()
            .unwrap_or_else(|| prompt.generation());

        if evaluations.iter().all(|e| e.is_failed()) {
            debug!("No synthesis for {}: nothing was scored", prompt.lineage());
            return SynthesisNote::placeholder(prompt.id(), generation);
        }

        let request = synthesis_request(prompt, evaluations, reflections);
        let label = format!("synthesis for {}", prompt.lineage());

        match self.ask(&label, &request).await {
            Ok(text) => SynthesisNote::new(prompt.id(), generation, text),
            Err(e) => {
                warn!("Synthesis degraded: {}", e);
                SynthesisNote::placeholder(prompt.id(), generation)
            }
        }
    }

    /// Reflect on a panel and then summarise it.
    pub async fn review(&self, prompt: &Prompt, evaluations: &[EvaluationResult]) -> PanelReview {
        let reflections = self.reflect_panel(prompt, evaluations).await;
        let synthesis = self.synthesize(prompt, evaluations, &reflections).await;

        let review = PanelReview {
            reflections,
            synthesis,
        };
        info!(
            "Reviewed {}: {} reflection(s), {} degraded",
            prompt.lineage(),
            review.reflections.len(),
            review.degraded()
        );
        review
    }

    async fn ask(&self, label: &str, request: &str) -> Result<String, CallError> {
        let text = self
            .gate
            .call(label, || self.generator.generate(request))
            .await?;
        if text.trim().is_empty() {
            return Err(CallError::Failed {
                label: label.to_string(),
                attempts: 1,
                message: "empty response".to_string(),
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptevo_collab::{CallPolicy, ScriptedGenerator};
    use promptevo_core::{PersonaId, Score, ScoredOutcome, Transcript, NO_ANALYSIS};
    use std::num::NonZeroUsize;
    use std::time::Duration;

    fn gate() -> CallGate {
        CallGate::new(
            NonZeroUsize::new(2).unwrap(),
            CallPolicy::new().with_retries(0).with_backoff(Duration::ZERO),
        )
    }

    fn scored(prompt: &Prompt, persona: &str, delta: f64) -> EvaluationResult {
        EvaluationResult::scored(
            prompt.id(),
            PersonaId::new(persona),
            1,
            ScoredOutcome::new(Score::new(1.0), Score::new(1.0 + delta), Transcript::new()),
        )
    }

    #[tokio::test]
    async fn test_reflect_wraps_response_verbatim() {
        let generator = Arc::new(ScriptedGenerator::new(["  Warmth helped.  "]));
        let engine = ReflectionEngine::new(generator.clone(), gate());
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");

        let note = engine.reflect(&prompt, &scored(&prompt, "a", 0.3)).await;

        assert_eq!(note.text, "  Warmth helped.  ");
        assert!(!note.degraded);
        assert_eq!(note.persona_id, PersonaId::new("a"));
        assert_eq!(note.generation, 1);
        assert_eq!(generator.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_evaluation_skips_collaborator() {
        let generator = Arc::new(ScriptedGenerator::new(["unused"]));
        let engine = ReflectionEngine::new(generator.clone(), gate());
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");
        let failed = EvaluationResult::failed(prompt.id(), PersonaId::new("a"), 1, "timeout");

        let note = engine.reflect(&prompt, &failed).await;

        assert!(note.degraded);
        assert_eq!(note.text, NO_ANALYSIS);
        assert!(generator.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_generator_failure_degrades() {
        let engine = ReflectionEngine::new(Arc::new(ScriptedGenerator::failing()), gate());
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");
        let evaluations = vec![scored(&prompt, "a", 0.3), scored(&prompt, "b", -0.1)];

        let review = engine.review(&prompt, &evaluations).await;

        assert_eq!(review.reflections.len(), 2);
        assert!(review.reflections.iter().all(|n| n.degraded));
        assert!(review.synthesis.degraded);
        assert_eq!(review.synthesis.text, NO_ANALYSIS);
        assert_eq!(review.degraded(), 3);
    }

    #[tokio::test]
    async fn test_empty_response_degrades() {
        let engine = ReflectionEngine::new(Arc::new(ScriptedGenerator::new(["   "])), gate());
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");

        let note = engine.reflect(&prompt, &scored(&prompt, "a", 0.3)).await;
        assert!(note.degraded);
    }

    #[tokio::test]
    async fn test_per_persona_reflection_can_be_disabled() {
        let generator = Arc::new(ScriptedGenerator::new(["Keep the pacing."]));
        let engine = ReflectionEngine::new(generator.clone(), gate())
            .with_config(ReflectionConfig::default().with_reflect_per_persona(false));
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");
        let evaluations = vec![scored(&prompt, "a", 0.3)];

        let review = engine.review(&prompt, &evaluations).await;

        assert!(review.reflections.is_empty());
        assert_eq!(review.synthesis.text, "Keep the pacing.");
        assert_eq!(review.synthesis.generation, 1);
        assert_eq!(generator.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_panel_synthesis_is_placeholder() {
        let generator = Arc::new(ScriptedGenerator::new(["unused"]));
        let engine = ReflectionEngine::new(generator.clone(), gate());
        let prompt = Prompt::seed("Genesis", "You are a warm coach.");
        let evaluations = vec![EvaluationResult::failed(prompt.id(), PersonaId::new("a"), 2, "down")];

        let note = engine.synthesize(&prompt, &evaluations, &[]).await;

        assert!(note.degraded);
        assert_eq!(note.generation, 2);
        assert!(generator.requests().await.is_empty());
    }
}
