//! Optimizer configuration.

use crate::BreedingPolicy;
use promptevo_collab::CallPolicy;
use promptevo_core::{Objective, Persona, PersonaId};
use promptevo_execution::AggregationConfig;
use promptevo_reflection::ReflectionConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration rejected before any collaborator is called.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// No personas to evaluate against
    #[error("persona panel is empty")]
    EmptyPanel,

    /// Two personas share an id
    #[error("duplicate persona id: {0}")]
    DuplicatePersona(PersonaId),

    /// No seed prompts
    #[error("at least one seed prompt is required")]
    NoSeeds,

    /// A seed prompt has no text
    #[error("seed prompt {0} is empty")]
    EmptySeed(usize),

    /// Generation budget of zero
    #[error("generation budget must be at least 1")]
    ZeroGenerations,

    /// No children per generation
    #[error("children per generation must be at least 1")]
    ZeroChildren,

    /// Concurrency gate of size zero
    #[error("max concurrent calls must be at least 1")]
    ZeroConcurrency,

    /// Per-call timeout of zero
    #[error("call timeout must be positive")]
    ZeroTimeout,

    /// Operators need at least one attempt
    #[error("operator attempts must be at least 1")]
    ZeroAttempts,

    /// Sub-sampling zero personas
    #[error("personas per generation must be at least 1")]
    ZeroSample,

    /// No objectives to select on
    #[error("objective set is empty")]
    EmptyObjectives,

    /// A rate or ratio outside [0, 1]
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Field name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// A sampling weight that is not positive
    #[error("{name} must be positive, got {value}")]
    NonPositiveWeight {
        /// Field name
        name: &'static str,
        /// Offending value
        value: f64,
    },
}

/// Configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Generations to evaluate (the last one is not bred)
    pub generations: u32,
    /// Optional wall-clock budget, in milliseconds on the wire
    #[serde(rename = "wall_clock_budget_ms", with = "optional_millis")]
    pub wall_clock_budget: Option<Duration>,
    /// Children bred per generation
    pub children_per_generation: usize,
    /// Share of children produced by crossover
    pub crossover_ratio: f64,
    /// Exchanges per simulated conversation
    pub turn_budget: usize,
    /// Size of the shared concurrency gate
    pub max_concurrent_calls: usize,
    /// Per-attempt collaborator timeout, in milliseconds on the wire
    #[serde(rename = "call_timeout_ms", with = "millis")]
    pub call_timeout: Duration,
    /// Extra attempts per collaborator call
    pub call_retries: u32,
    /// Objectives for Pareto selection
    pub objectives: Vec<Objective>,
    /// Failure rate above which a record is low-confidence
    pub low_confidence_threshold: f64,
    /// Evaluate against a random subset of this many personas per generation
    pub personas_per_generation: Option<usize>,
    /// Generation attempts per child before the clone fallback
    pub operator_attempts: u32,
    /// Parent selection
    pub breeding: BreedingPolicy,
    /// Reflection behaviour
    pub reflection: ReflectionConfig,
    /// Seed for reproducible sampling; drawn from entropy when absent
    pub rng_seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            generations: 5,
            wall_clock_budget: None,
            children_per_generation: 6,
            crossover_ratio: 0.3,
            turn_budget: 4,
            max_concurrent_calls: 4,
            call_timeout: Duration::from_secs(60),
            call_retries: 1,
            objectives: vec![Objective::MeanImprovement, Objective::Consistency],
            low_confidence_threshold: 0.5,
            personas_per_generation: None,
            operator_attempts: 2,
            breeding: BreedingPolicy::default(),
            reflection: ReflectionConfig::default(),
            rng_seed: None,
        }
    }
}

impl OptimizerConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generation budget.
    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = generations;
        self
    }

    /// Set the wall-clock budget.
    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget = Some(budget);
        self
    }

    /// Set children per generation.
    pub fn with_children(mut self, children: usize) -> Self {
        self.children_per_generation = children;
        self
    }

    /// Set the crossover ratio.
    pub fn with_crossover_ratio(mut self, ratio: f64) -> Self {
        self.crossover_ratio = ratio;
        self
    }

    /// Set the conversation turn budget.
    pub fn with_turn_budget(mut self, turns: usize) -> Self {
        self.turn_budget = turns;
        self
    }

    /// Set the concurrency gate size.
    pub fn with_max_concurrent_calls(mut self, calls: usize) -> Self {
        self.max_concurrent_calls = calls;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set retries per collaborator call.
    pub fn with_call_retries(mut self, retries: u32) -> Self {
        self.call_retries = retries;
        self
    }

    /// Set the objective set.
    pub fn with_objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.objectives = objectives;
        self
    }

    /// Set the low-confidence threshold.
    pub fn with_low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.low_confidence_threshold = threshold;
        self
    }

    /// Sub-sample the persona panel each generation.
    pub fn with_personas_per_generation(mut self, personas: usize) -> Self {
        self.personas_per_generation = Some(personas);
        self
    }

    /// Set the breeding policy.
    pub fn with_breeding(mut self, breeding: BreedingPolicy) -> Self {
        self.breeding = breeding;
        self
    }

    /// Set the reflection configuration.
    pub fn with_reflection(mut self, reflection: ReflectionConfig) -> Self {
        self.reflection = reflection;
        self
    }

    /// Fix the sampling seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Check the configuration against the panel and seeds.
    pub fn validate(&self, personas: &[Persona], seeds: &[String]) -> Result<(), ConfigError> {
        if personas.is_empty() {
            return Err(ConfigError::EmptyPanel);
        }
        let mut ids = BTreeSet::new();
        for persona in personas {
            if !ids.insert(&persona.id) {
                return Err(ConfigError::DuplicatePersona(persona.id.clone()));
            }
        }

        if seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        if let Some(index) = seeds.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptySeed(index));
        }

        if self.generations == 0 {
            return Err(ConfigError::ZeroGenerations);
        }
        if self.children_per_generation == 0 {
            return Err(ConfigError::ZeroChildren);
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.operator_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.personas_per_generation == Some(0) {
            return Err(ConfigError::ZeroSample);
        }
        if self.objectives.is_empty() {
            return Err(ConfigError::EmptyObjectives);
        }

        for (name, value) in [
            ("crossover_ratio", self.crossover_ratio),
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("exploration_rate", self.breeding.exploration_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("rank_decay", self.breeding.rank_decay),
            ("min_weight", self.breeding.min_weight),
            ("low_confidence_weight", self.breeding.low_confidence_weight),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::NonPositiveWeight { name, value });
            }
        }

        Ok(())
    }

    /// Timeout and retry policy for collaborator calls.
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy::new()
            .with_timeout(self.call_timeout)
            .with_retries(self.call_retries)
    }

    /// Fitness aggregation settings.
    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            objectives: self.objectives.clone(),
            low_confidence_threshold: self.low_confidence_threshold,
        }
    }

    /// Crossover children out of `children_per_generation`.
    pub fn crossover_children(&self) -> usize {
        let share = self.children_per_generation as f64 * self.crossover_ratio;
        (share.round() as usize).min(self.children_per_generation)
    }
}

/// Durations as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personas() -> Vec<Persona> {
        vec![Persona::new("a", "Avery"), Persona::new("b", "Blair")]
    }

    fn seeds() -> Vec<String> {
        vec!["You are a coach.".to_string()]
    }

    #[test]
    fn test_default_is_valid() {
        assert!(OptimizerConfig::default().validate(&personas(), &seeds()).is_ok());
    }

    #[test]
    fn test_rejects_bad_panel_and_seeds() {
        let config = OptimizerConfig::default();
        assert_eq!(config.validate(&[], &seeds()), Err(ConfigError::EmptyPanel));

        let twins = vec![Persona::new("a", "Avery"), Persona::new("a", "Ash")];
        assert_eq!(
            config.validate(&twins, &seeds()),
            Err(ConfigError::DuplicatePersona(PersonaId::new("a")))
        );

        assert_eq!(config.validate(&personas(), &[]), Err(ConfigError::NoSeeds));
        assert_eq!(
            config.validate(&personas(), &["You are a coach.".to_string(), " ".to_string()]),
            Err(ConfigError::EmptySeed(1))
        );
    }

    #[test]
    fn test_rejects_bad_budgets() {
        let check = |config: OptimizerConfig| config.validate(&personas(), &seeds());

        assert_eq!(check(OptimizerConfig::new().with_generations(0)), Err(ConfigError::ZeroGenerations));
        assert_eq!(check(OptimizerConfig::new().with_children(0)), Err(ConfigError::ZeroChildren));
        assert_eq!(
            check(OptimizerConfig::new().with_max_concurrent_calls(0)),
            Err(ConfigError::ZeroConcurrency)
        );
        assert_eq!(
            check(OptimizerConfig::new().with_call_timeout(Duration::ZERO)),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(check(OptimizerConfig::new().with_objectives(vec![])), Err(ConfigError::EmptyObjectives));
        assert!(matches!(
            check(OptimizerConfig::new().with_crossover_ratio(1.5)),
            Err(ConfigError::OutOfRange { name: "crossover_ratio", .. })
        ));
        assert!(matches!(
            check(OptimizerConfig::new().with_breeding(BreedingPolicy::default().with_rank_decay(0.0))),
            Err(ConfigError::NonPositiveWeight { name: "rank_decay", .. })
        ));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: OptimizerConfig = serde_json::from_str(
            r#"{"generations": 3, "objectives": ["mean_improvement", {"criterion": "stay_calm"}]}"#,
        )
        .unwrap();

        assert_eq!(config.generations, 3);
        assert_eq!(config.children_per_generation, 6);
        assert_eq!(
            config.objectives,
            vec![Objective::MeanImprovement, Objective::Criterion("stay_calm".to_string())]
        );
        assert!(config.reflection.reflect_per_persona);
    }

    #[test]
    fn test_sub_second_durations_survive() {
        let config = OptimizerConfig::new()
            .with_call_timeout(Duration::from_millis(1500))
            .with_wall_clock_budget(Duration::from_millis(900));

        assert_eq!(config.call_policy().timeout, Duration::from_millis(1500));
        assert_eq!(config.wall_clock_budget, Some(Duration::from_millis(900)));

        let short = OptimizerConfig::new().with_call_timeout(Duration::from_millis(500));
        assert!(short.validate(&personas(), &seeds()).is_ok());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["call_timeout_ms"], 1500);
        assert_eq!(json["wall_clock_budget_ms"], 900);
        let back: OptimizerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_crossover_children() {
        let config = OptimizerConfig::new().with_children(6).with_crossover_ratio(0.3);
        assert_eq!(config.crossover_children(), 2);
        assert_eq!(config.with_crossover_ratio(1.0).crossover_children(), 6);
    }
}
