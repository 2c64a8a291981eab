//! Reporting surface handed to persistence or visualization layers.

use crate::GenerationSummary;
use async_trait::async_trait;
use promptevo_core::{FitnessRecord, Generation, NoteLog, Prompt, PromptId};
use serde::Serialize;

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// The configured number of generations was evaluated
    GenerationBudget,
    /// The wall-clock budget ran out
    WallClock,
    /// Every evaluation of a generation failed
    Starved {
        /// The generation with no fitness signal
        generation: Generation,
    },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::GenerationBudget => write!(f, "generation budget reached"),
            HaltReason::WallClock => write!(f, "wall-clock budget reached"),
            HaltReason::Starved { generation } => {
                write!(f, "every evaluation failed in generation {}", generation)
            }
        }
    }
}

/// Read-only view of a finished (or halted) run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    /// Why the run stopped, if it has
    pub halt: Option<HaltReason>,
    /// Generations that went through selection; a starved generation is
    /// summarized but not counted
    pub generations_completed: usize,
    /// Every prompt, in creation order
    pub population: Vec<Prompt>,
    /// Every fitness record
    pub records: Vec<FitnessRecord>,
    /// Final Pareto frontier
    pub frontier: Vec<PromptId>,
    /// Best prompt by fitness
    pub best: Option<PromptId>,
    /// Per-generation summaries
    pub summaries: Vec<GenerationSummary>,
    /// Reflection and synthesis notes
    pub notes: NoteLog,
}

impl OptimizationReport {
    /// The best prompt, if any prompt was tested.
    pub fn best_prompt(&self) -> Option<&Prompt> {
        let best = self.best?;
        self.population.iter().find(|p| p.id() == best)
    }

    /// Frontier prompts in frontier order.
    pub fn frontier_prompts(&self) -> Vec<&Prompt> {
        self.frontier
            .iter()
            .filter_map(|id| self.population.iter().find(|p| p.id() == *id))
            .collect()
    }
}

/// Receives read-only reports as the run progresses.
///
/// Sink errors are logged and never stop the optimizer.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Called after each generation's selection step.
    async fn generation_complete(&self, summary: &GenerationSummary) -> Result<(), anyhow::Error>;

    /// Called once when the run terminates.
    async fn run_complete(&self, report: &OptimizationReport) -> Result<(), anyhow::Error>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl ReportSink for NoopSink {
    async fn generation_complete(&self, _summary: &GenerationSummary) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn run_complete(&self, _report: &OptimizationReport) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
