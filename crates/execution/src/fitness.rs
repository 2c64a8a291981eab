//! Fitness aggregation across a persona panel.

use crate::EvaluationAdapter;
use futures::future::join_all;
use promptevo_core::{
    EvaluationResult, FitnessRecord, Generation, Objective, Persona, Prompt, ScoredOutcome,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How panel results are reduced.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Objectives measured into each record
    pub objectives: Vec<Objective>,
    /// Failure rate above which a record is flagged low-confidence
    pub low_confidence_threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            objectives: vec![Objective::MeanImprovement, Objective::Consistency],
            low_confidence_threshold: 0.5,
        }
    }
}

/// Everything one panel produced for one prompt.
#[derive(Debug, Clone)]
pub struct PanelOutcome {
    /// Per-persona results, ordered by persona id
    pub results: Vec<EvaluationResult>,
    /// Aggregate, absent when no evaluation was scored
    pub record: Option<FitnessRecord>,
}

impl PanelOutcome {
    /// Failed evaluations in the panel.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    /// Whether every evaluation failed.
    pub fn is_censored(&self) -> bool {
        self.record.is_none()
    }
}

/// Runs a prompt against its persona panel and reduces the results.
pub struct FitnessAggregator {
    adapter: Arc<dyn EvaluationAdapter>,
    config: AggregationConfig,
}

impl FitnessAggregator {
    /// Create an aggregator.
    pub fn new(adapter: Arc<dyn EvaluationAdapter>) -> Self {
        Self {
            adapter,
            config: AggregationConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: AggregationConfig) -> Self {
        self.config = config;
        self
    }

    /// Objectives measured into records.
    pub fn objectives(&self) -> &[Objective] {
        &self.config.objectives
    }

    /// Evaluate `prompt` against every persona concurrently and reduce.
    ///
    /// Concurrency is bounded by the gate inside the adapter, not here.
    pub async fn aggregate(
        &self,
        prompt: &Prompt,
        personas: &[Persona],
        generation: Generation,
    ) -> PanelOutcome {
        debug!("Evaluating {} against {} personas", prompt.lineage(), personas.len());

        let evaluations = personas
            .iter()
            .map(|persona| self.adapter.evaluate(prompt, persona, generation));
        let mut results = join_all(evaluations).await;
        results.sort_by(|a, b| a.persona_id.cmp(&b.persona_id));

        let record = reduce(prompt, generation, &results, &self.config);
        match &record {
            Some(record) => {
                info!(
                    "{}: fitness {:+.3} ({} scored, {} failed{})",
                    prompt.lineage(),
                    record.fitness,
                    record.scored,
                    record.failed,
                    if record.low_confidence { ", low confidence" } else { "" }
                );
            }
            None => warn!("{}: every evaluation failed", prompt.lineage()),
        }

        PanelOutcome { results, record }
    }
}

/// Reduce panel results into a fitness record.
///
/// The reduction is independent of the order of `results`. Returns `None`
/// when nothing was scored.
pub fn reduce(
    prompt: &Prompt,
    evaluated_in: Generation,
    results: &[EvaluationResult],
    config: &AggregationConfig,
) -> Option<FitnessRecord> {
    let scored: Vec<&ScoredOutcome> = results.iter().filter_map(|r| r.scored_outcome()).collect();
    if scored.is_empty() {
        return None;
    }

    let failed = results.len() - scored.len();
    let failure_rate = failed as f64 / results.len() as f64;

    Some(FitnessRecord {
        prompt_id: prompt.id(),
        prompt_generation: prompt.generation(),
        evaluated_in,
        fitness: Objective::MeanImprovement.measure(&scored),
        objectives: config
            .objectives
            .iter()
            .map(|objective| objective.measure(&scored))
            .collect(),
        scored: scored.len(),
        failed,
        low_confidence: failure_rate > config.low_confidence_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use promptevo_core::{PersonaId, Score, Transcript};
    use std::collections::HashMap;

    /// Adapter returning a fixed improvement per persona; `None` fails.
    struct FixedAdapter {
        improvements: HashMap<PersonaId, Option<f64>>,
    }

    impl FixedAdapter {
        fn new(entries: &[(&str, Option<f64>)]) -> Self {
            Self {
                improvements: entries
                    .iter()
                    .map(|(id, v)| (PersonaId::new(*id), *v))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EvaluationAdapter for FixedAdapter {
        async fn evaluate(
            &self,
            prompt: &Prompt,
            persona: &Persona,
            generation: Generation,
        ) -> EvaluationResult {
            match self.improvements.get(&persona.id).copied().flatten() {
                Some(delta) => EvaluationResult::scored(
                    prompt.id(),
                    persona.id.clone(),
                    generation,
                    ScoredOutcome::new(Score::new(2.0), Score::new(2.0 + delta), Transcript::new()),
                ),
                None => EvaluationResult::failed(prompt.id(), persona.id.clone(), generation, "down"),
            }
        }
    }

    fn panel(ids: &[&str]) -> Vec<Persona> {
        ids.iter().map(|id| Persona::new(*id, *id)).collect()
    }

    #[tokio::test]
    async fn test_mean_improvement_scenario() {
        let adapter = FixedAdapter::new(&[("a", Some(0.2)), ("b", Some(0.4)), ("c", Some(0.6))]);
        let aggregator = FitnessAggregator::new(Arc::new(adapter));
        let prompt = Prompt::seed("Genesis", "You are a helpful coach.");

        let outcome = aggregator.aggregate(&prompt, &panel(&["a", "b", "c"]), 0).await;
        let record = outcome.record.unwrap();

        assert!((record.fitness - 0.4).abs() < 1e-9);
        assert_eq!(record.scored, 3);
        assert_eq!(record.failed, 0);
        assert!(!record.low_confidence);
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_censored_and_counted() {
        let adapter = FixedAdapter::new(&[("a", Some(1.0)), ("b", None), ("c", None)]);
        let aggregator = FitnessAggregator::new(Arc::new(adapter));
        let prompt = Prompt::seed("Genesis", "You are a helpful coach.");

        let outcome = aggregator.aggregate(&prompt, &panel(&["a", "b", "c"]), 0).await;
        let record = outcome.record.clone().unwrap();

        assert!((record.fitness - 1.0).abs() < 1e-9);
        assert_eq!(record.failed, 2);
        assert!(record.low_confidence);
        assert_eq!(outcome.failed(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_has_no_record() {
        let adapter = FixedAdapter::new(&[("a", None), ("b", None)]);
        let aggregator = FitnessAggregator::new(Arc::new(adapter));
        let prompt = Prompt::seed("Genesis", "You are a helpful coach.");

        let outcome = aggregator.aggregate(&prompt, &panel(&["a", "b"]), 0).await;
        assert!(outcome.is_censored());
        assert_eq!(outcome.failed(), 2);
    }

    #[test]
    fn test_reduce_ignores_result_order() {
        let prompt = Prompt::seed("Genesis", "You are a helpful coach.");
        let config = AggregationConfig {
            objectives: vec![
                Objective::MeanImprovement,
                Objective::Consistency,
                Objective::WorstCase,
                Objective::SuccessRate,
            ],
            low_confidence_threshold: 0.5,
        };
        let deltas = [0.1, 0.7, -0.3, 0.30000000000000004, 1e-9, 0.2];
        let mut results: Vec<EvaluationResult> = deltas
            .iter()
            .enumerate()
            .map(|(i, d)| {
                EvaluationResult::scored(
                    prompt.id(),
                    PersonaId::new(format!("p{}", i)),
                    0,
                    ScoredOutcome::new(Score::new(1.0), Score::new(1.0 + d), Transcript::new()),
                )
            })
            .collect();
        results.push(EvaluationResult::failed(prompt.id(), "px".into(), 0, "down"));

        let forward = reduce(&prompt, 0, &results, &config).unwrap();
        results.reverse();
        let backward = reduce(&prompt, 0, &results, &config).unwrap();
        results.swap(0, 3);
        let shuffled = reduce(&prompt, 0, &results, &config).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }
}
