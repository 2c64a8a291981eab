//! Fitness records - a prompt's aggregate over its persona panel.

use crate::id::PromptId;
use crate::Generation;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Aggregate outcome of one prompt across its persona panel for one
/// evaluation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    /// Prompt the record belongs to
    pub prompt_id: PromptId,

    /// Generation of the prompt itself
    pub prompt_generation: Generation,

    /// Generation in which this evaluation ran
    pub evaluated_in: Generation,

    /// Scalar fitness: mean improvement over scored evaluations
    pub fitness: f64,

    /// Objective values, aligned with the configured objective set
    pub objectives: Vec<f64>,

    /// Scored evaluations
    pub scored: usize,

    /// Failed (censored) evaluations
    pub failed: usize,

    /// Failure rate exceeded the configured threshold
    pub low_confidence: bool,
}

impl FitnessRecord {
    /// Total evaluations attempted.
    pub fn attempted(&self) -> usize {
        self.scored + self.failed
    }

    /// Share of evaluations that failed.
    pub fn failure_rate(&self) -> f64 {
        if self.attempted() == 0 {
            return 0.0;
        }
        self.failed as f64 / self.attempted() as f64
    }

    /// Ranking order, best first: higher fitness, then fewer failed
    /// evaluations, then earlier generation, then prompt id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .fitness
            .total_cmp(&self.fitness)
            .then_with(|| self.failed.cmp(&other.failed))
            .then_with(|| self.prompt_generation.cmp(&other.prompt_generation))
            .then_with(|| self.prompt_id.cmp(&other.prompt_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fitness: f64, failed: usize, generation: Generation) -> FitnessRecord {
        FitnessRecord {
            prompt_id: PromptId::new(),
            prompt_generation: generation,
            evaluated_in: generation,
            fitness,
            objectives: vec![fitness],
            scored: 3,
            failed,
            low_confidence: false,
        }
    }

    #[test]
    fn test_rank_prefers_higher_fitness() {
        let a = record(0.6, 2, 3);
        let b = record(0.4, 0, 0);
        assert_eq!(a.rank_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_rank_tie_breaks_on_failures_then_generation() {
        let fewer_failures = record(0.5, 0, 4);
        let more_failures = record(0.5, 1, 0);
        assert_eq!(fewer_failures.rank_cmp(&more_failures), Ordering::Less);

        let earlier = record(0.5, 0, 1);
        let later = record(0.5, 0, 2);
        assert_eq!(earlier.rank_cmp(&later), Ordering::Less);
    }

    #[test]
    fn test_failure_rate() {
        let r = record(0.1, 1, 0);
        assert!((r.failure_rate() - 0.25).abs() < 1e-12);
    }
}
