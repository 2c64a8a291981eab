//! Execution layer - evaluating prompts against a persona panel.

#![warn(missing_docs)]

pub mod evaluator;
pub mod fitness;

pub use evaluator::{EvaluationAdapter, CollaboratorEvaluator};
pub use fitness::{FitnessAggregator, AggregationConfig, PanelOutcome, reduce};
