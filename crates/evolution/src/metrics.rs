//! Per-generation metrics.

use promptevo_core::{Generation, PromptId};
use serde::{Deserialize, Serialize};

/// Counts of children by how they were produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedingStatistics {
    /// Frontier members carried over for re-testing
    pub elites: usize,
    /// Accepted mutation children
    pub mutations: usize,
    /// Accepted crossover children
    pub crossovers: usize,
    /// Clones of the fitter parent after repeated rejection
    pub clones: usize,
    /// Crossovers downgraded to mutation for lack of a second parent
    pub crossover_fallbacks: usize,
    /// Children dropped because the population refused them
    pub dropped: usize,
}

impl BreedingStatistics {
    /// Children added to the population.
    pub fn children(&self) -> usize {
        self.elites + self.mutations + self.crossovers + self.clones
    }
}

/// What happened in one generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Generation number
    pub generation: Generation,
    /// Prompts evaluated this generation
    pub evaluated: usize,
    /// Evaluated prompts with no scored result
    pub censored: usize,
    /// Failed persona evaluations
    pub failed_evaluations: usize,
    /// Records flagged low-confidence
    pub low_confidence: usize,
    /// Notes that fell back to the placeholder
    pub degraded_notes: usize,
    /// Best fitness among all tested prompts
    pub best_fitness: Option<f64>,
    /// Prompt holding the best fitness
    pub best_prompt: Option<PromptId>,
    /// Pareto frontier after selection
    pub frontier: Vec<PromptId>,
    /// Breeding pool after selection
    pub breeding_pool: Vec<PromptId>,
    /// Children bred for the next generation
    pub breeding: BreedingStatistics,
    /// Population size at the end of the generation
    pub population_size: usize,
    /// Wall-clock time spent (milliseconds)
    pub duration_ms: u64,
}
