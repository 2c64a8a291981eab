//! Genetic operators - mutation and crossover through the text generator.

use crate::lineage::LineageNamer;
use crate::validation::{normalize, ChildValidator, ValidationError};
use promptevo_collab::{CallError, CallGate, TextGenerator};
use promptevo_core::{
    FitnessRecord, Generation, OperatorKind, Origin, Prompt, SynthesisNote, NO_ANALYSIS,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Strongest criteria listed per parent.
const STRONGEST_SHOWN: usize = 3;
/// Weakest criteria listed for a mutation.
const WEAKEST_SHOWN: usize = 5;

/// Everything an operator knows about one parent.
#[derive(Debug, Clone)]
pub struct ParentContext {
    /// The parent prompt
    pub prompt: Prompt,
    /// Its latest fitness record
    pub record: Option<FitnessRecord>,
    /// Mean improvement per questionnaire criterion
    pub criteria: BTreeMap<String, f64>,
    /// Its latest synthesis
    pub synthesis: Option<SynthesisNote>,
}

impl ParentContext {
    /// Context with nothing but the prompt.
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            record: None,
            criteria: BTreeMap::new(),
            synthesis: None,
        }
    }

    /// Attach a fitness record.
    pub fn with_record(mut self, record: FitnessRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach per-criterion improvements.
    pub fn with_criteria(mut self, criteria: BTreeMap<String, f64>) -> Self {
        self.criteria = criteria;
        self
    }

    /// Attach a synthesis.
    pub fn with_synthesis(mut self, synthesis: SynthesisNote) -> Self {
        self.synthesis = Some(synthesis);
        self
    }

    fn fitness_line(&self) -> String {
        match &self.record {
            Some(record) => format!(
                "mean improvement {:+.3} across {} persona(s), generation {}",
                record.fitness,
                record.scored,
                self.prompt.generation()
            ),
            None => format!("not yet evaluated, generation {}", self.prompt.generation()),
        }
    }

    /// Criteria sorted best first.
    fn ranked_criteria(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.criteria.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    fn strongest(&self) -> String {
        let ranked = self.ranked_criteria();
        if ranked.is_empty() {
            return "No specific strong areas identified".to_string();
        }
        list(ranked.iter().take(STRONGEST_SHOWN))
    }

    fn weakest(&self) -> String {
        let ranked = self.ranked_criteria();
        if ranked.is_empty() {
            return "No specific weak areas identified".to_string();
        }
        list(ranked.iter().rev().take(WEAKEST_SHOWN))
    }
}

fn list<'a>(criteria: impl Iterator<Item = &'a (&'a str, f64)>) -> String {
    criteria
        .map(|(name, delta)| format!("{}: {:+.3}", name, delta))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A child and how it was obtained.
#[derive(Debug, Clone)]
pub struct Offspring {
    /// The new prompt
    pub prompt: Prompt,
    /// Generation attempts used
    pub attempts: u32,
    /// Why attempts were rejected, oldest first
    pub rejections: Vec<String>,
}

impl Offspring {
    /// Whether the fitter parent was cloned.
    pub fn is_clone(&self) -> bool {
        self.prompt.operator() == OperatorKind::Clone
    }
}

/// Mutation and crossover backed by the text generator.
///
/// Generated text is normalized and checked by the [`ChildValidator`]. A
/// rejected or failed attempt is retried; once attempts run out the fitter
/// parent's text is cloned into a new prompt.
pub struct GeneticOperators {
    generator: Arc<dyn TextGenerator>,
    gate: CallGate,
    validator: ChildValidator,
    attempts: u32,
}

impl GeneticOperators {
    /// Create operators with the system-prompt validator and one retry.
    pub fn new(generator: Arc<dyn TextGenerator>, gate: CallGate) -> Self {
        Self {
            generator,
            gate,
            validator: ChildValidator::system_prompt(),
            attempts: 2,
        }
    }

    /// Replace the validator.
    pub fn with_validator(mut self, validator: ChildValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Set attempts per child (at least one).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Validator in use.
    pub fn validator(&self) -> &ChildValidator {
        &self.validator
    }

    /// Revise one parent using its synthesis.
    pub async fn mutate(
        &self,
        parent: &ParentContext,
        generation: Generation,
        namer: &mut LineageNamer,
    ) -> Offspring {
        let generation = child_generation(generation, &[&parent.prompt]);
        let request = self.mutation_request(parent);
        let label = format!("mutation of {}", parent.prompt.lineage());

        let (accepted, attempts, rejections) = self
            .produce(&label, &request, &[parent.prompt.text()])
            .await;

        let prompt = match accepted {
            Some(text) => {
                let lineage = namer.child(generation, OperatorKind::Mutation, &[parent.prompt.lineage()]);
                info!("Mutation: {} -> {}", parent.prompt.lineage(), lineage);
                Prompt::new(
                    Origin::Mutation {
                        parent: parent.prompt.id(),
                    },
                    generation,
                    lineage,
                    text,
                )
            }
            None => clone_parent(&parent.prompt, generation, namer),
        };

        Offspring {
            prompt,
            attempts,
            rejections,
        }
    }

    /// Blend two parents.
    pub async fn crossover(
        &self,
        first: &ParentContext,
        second: &ParentContext,
        generation: Generation,
        namer: &mut LineageNamer,
    ) -> Offspring {
        let generation = child_generation(generation, &[&first.prompt, &second.prompt]);
        let request = self.crossover_request(first, second);
        let label = format!(
            "crossover of {} and {}",
            first.prompt.lineage(),
            second.prompt.lineage()
        );

        let (accepted, attempts, rejections) = self
            .produce(&label, &request, &[first.prompt.text(), second.prompt.text()])
            .await;

        let prompt = match accepted {
            Some(text) => {
                let lineage = namer.child(
                    generation,
                    OperatorKind::Crossover,
                    &[first.prompt.lineage(), second.prompt.lineage()],
                );
                info!(
                    "Crossover: {} + {} -> {}",
                    first.prompt.lineage(),
                    second.prompt.lineage(),
                    lineage
                );
                Prompt::new(
                    Origin::Crossover {
                        first: first.prompt.id(),
                        second: second.prompt.id(),
                    },
                    generation,
                    lineage,
                    text,
                )
            }
            None => clone_parent(&fitter(first, second).prompt, generation, namer),
        };

        Offspring {
            prompt,
            attempts,
            rejections,
        }
    }

    /// Ask for child text until it validates or attempts run out.
    async fn produce(
        &self,
        label: &str,
        request: &str,
        parents: &[&str],
    ) -> (Option<String>, u32, Vec<String>) {
        let mut rejections = Vec::new();

        for attempt in 1..=self.attempts {
            let request = match rejections.last() {
                Some(reason) => format!(
                    "{}\n\nYour previous answer was rejected ({}). Try again.",
                    request, reason
                ),
                None => request.to_string(),
            };

            let reason = match self.generate(label, &request, parents).await {
                Ok(text) => {
                    debug!("{} accepted on attempt {}", label, attempt);
                    return (Some(text), attempt, rejections);
                }
                Err(reason) => reason,
            };
            warn!("{} attempt {} rejected: {}", label, attempt, reason);
            rejections.push(reason);
        }

        (None, self.attempts, rejections)
    }

    async fn generate(&self, label: &str, request: &str, parents: &[&str]) -> Result<String, String> {
        let raw = self
            .gate
            .call(label, || self.generator.generate(request))
            .await
            .map_err(|e: CallError| e.to_string())?;
        let text = normalize(&raw);
        self.validator
            .validate(&text, parents)
            .map_err(|e: ValidationError| e.to_string())?;
        Ok(text)
    }

    fn requirements(&self) -> String {
        let mut lines = self.validator.requirements();
        lines.push("Respond with ONLY the new system prompt text, no explanations.".to_string());
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn mutation_request(&self, parent: &ParentContext) -> String {
        let synthesis = parent
            .synthesis
            .as_ref()
            .map(|s| s.text.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_ANALYSIS);

        format!(
            "You are an expert prompt engineer improving a coaching system prompt.\n\n\
             CURRENT SYSTEM PROMPT: \"{}\"\n\
             PERFORMANCE: {}\n\n\
             WEAKEST PERFORMING AREAS (need improvement):\n{}\n\n\
             STRONGEST PERFORMING AREAS (maintain these):\n{}\n\n\
             ANALYSIS OF RECENT CONVERSATIONS:\n{}\n\n\
             TASK: Write an improved system prompt that addresses the weak areas \
             while preserving what works.\n\
             REQUIREMENTS:\n{}",
            parent.prompt.text(),
            parent.fitness_line(),
            parent.weakest(),
            parent.strongest(),
            synthesis,
            self.requirements(),
        )
    }

    fn crossover_request(&self, first: &ParentContext, second: &ParentContext) -> String {
        format!(
            "You are an expert prompt engineer combining the strengths of two coaching system prompts.\n\n\
             PARENT 1 SYSTEM PROMPT: \"{}\"\n\
             PARENT 1 PERFORMANCE: {}\n\
             PARENT 1 TOP STRENGTHS: {}\n\n\
             PARENT 2 SYSTEM PROMPT: \"{}\"\n\
             PARENT 2 PERFORMANCE: {}\n\
             PARENT 2 TOP STRENGTHS: {}\n\n\
             TASK: Write one system prompt that combines the best of both parents \
             and improves on each.\n\
             REQUIREMENTS:\n{}",
            first.prompt.text(),
            first.fitness_line(),
            first.strongest(),
            second.prompt.text(),
            second.fitness_line(),
            second.strongest(),
            self.requirements(),
        )
    }
}

/// Child generation: at least one past every parent.
fn child_generation(requested: Generation, parents: &[&Prompt]) -> Generation {
    let oldest_allowed = parents
        .iter()
        .map(|p| p.generation().saturating_add(1))
        .max()
        .unwrap_or(requested);
    requested.max(oldest_allowed)
}

/// Better-ranked parent; a parent with a record beats one without.
fn fitter<'a>(first: &'a ParentContext, second: &'a ParentContext) -> &'a ParentContext {
    match (&first.record, &second.record) {
        (Some(a), Some(b)) if b.rank_cmp(a).is_lt() => second,
        (None, Some(_)) => second,
        _ => first,
    }
}

fn clone_parent(parent: &Prompt, generation: Generation, namer: &mut LineageNamer) -> Prompt {
    let lineage = namer.child(generation, OperatorKind::Clone, &[parent.lineage()]);
    warn!("Falling back to a clone of {} as {}", parent.lineage(), lineage);
    Prompt::new(
        Origin::Clone {
            parent: parent.id(),
        },
        generation,
        lineage,
        parent.text(),
    )
}
