//! Evolution layer - population, selection and breeding of system prompts.
//!
//! [`PopulationManager`] owns the search: it evaluates each generation
//! through the execution layer, collects notes from the reflection layer,
//! keeps a Pareto frontier and breeds the next generation with
//! [`GeneticOperators`].

#![warn(missing_docs, unused_crate_dependencies)]

mod config;
mod error;
mod lineage;
mod manager;
mod metrics;
mod operators;
pub mod pareto;
mod population;
mod report;
mod selection;
mod validation;

pub use config::{ConfigError, OptimizerConfig};
pub use error::{OptimizerError, PopulationError, Result};
pub use lineage::{parent_base, LineageNamer, GENESIS};
pub use manager::{GenerationState, PopulationManager};
pub use metrics::{BreedingStatistics, GenerationSummary};
pub use operators::{GeneticOperators, Offspring, ParentContext};
pub use population::{FitnessLedger, Population};
pub use report::{HaltReason, NoopSink, OptimizationReport, ReportSink};
pub use selection::{BreedingPolicy, BreedingPool, ParentSampler, PoolMember};
pub use validation::{
    normalize, ChildValidator, MaxChars, MinChars, Pattern, StartsWith, StructuralCheck,
    ValidationError,
};
