//! Breeding pool construction and parent sampling.

use crate::pareto;
use promptevo_core::{FitnessRecord, PromptId};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How parents are chosen from tested prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreedingPolicy {
    /// Non-frontier members added to the pool, fewest dominators first
    pub diversity_slots: usize,
    /// Weight of pool rank `r` is `rank_decay^r`
    pub rank_decay: f64,
    /// Floor on any member's weight
    pub min_weight: f64,
    /// Multiplier for low-confidence members
    pub low_confidence_weight: f64,
    /// Chance of drawing uniformly from every tested prompt instead
    pub exploration_rate: f64,
    /// Frontier members re-minted into the next generation, best first
    pub elites: usize,
}

impl Default for BreedingPolicy {
    fn default() -> Self {
        Self {
            diversity_slots: 2,
            rank_decay: 0.7,
            min_weight: 0.05,
            low_confidence_weight: 0.5,
            exploration_rate: 0.2,
            elites: 0,
        }
    }
}

impl BreedingPolicy {
    /// Set the number of diversity slots.
    pub fn with_diversity_slots(mut self, slots: usize) -> Self {
        self.diversity_slots = slots;
        self
    }

    /// Set the exploration rate.
    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    /// Carry up to `elites` frontier members into each new generation.
    pub fn with_elites(mut self, elites: usize) -> Self {
        self.elites = elites;
        self
    }

    /// Set the rank decay.
    pub fn with_rank_decay(mut self, decay: f64) -> Self {
        self.rank_decay = decay;
        self
    }
}

/// A prompt eligible to breed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolMember {
    /// The prompt
    pub prompt_id: PromptId,
    /// On the Pareto frontier (otherwise a diversity slot)
    pub on_frontier: bool,
    /// Sampling weight, always positive
    pub weight: f64,
}

/// Frontier members plus diversity slots, with sampling weights.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BreedingPool {
    members: Vec<PoolMember>,
}

impl BreedingPool {
    /// Build the pool from the latest record of every tested prompt.
    ///
    /// The pool is non-empty whenever `records` is.
    pub fn build(records: &[&FitnessRecord], policy: &BreedingPolicy) -> Self {
        let mut frontier = pareto::frontier(records);
        frontier.sort_by(|a, b| a.rank_cmp(b));

        let counts = pareto::domination_counts(records);
        let mut others: Vec<&FitnessRecord> = records
            .iter()
            .copied()
            .filter(|r| !frontier.iter().any(|f| f.prompt_id == r.prompt_id))
            .collect();
        others.sort_by(|a, b| {
            counts[&a.prompt_id]
                .cmp(&counts[&b.prompt_id])
                .then_with(|| a.rank_cmp(b))
        });
        others.truncate(policy.diversity_slots);

        let ranked = frontier
            .iter()
            .map(|r| (*r, true))
            .chain(others.iter().map(|r| (*r, false)));
        let members = ranked
            .enumerate()
            .map(|(rank, (record, on_frontier))| {
                let mut weight = policy.rank_decay.powi(rank as i32).max(policy.min_weight);
                if record.low_confidence {
                    weight *= policy.low_confidence_weight;
                }
                PoolMember {
                    prompt_id: record.prompt_id,
                    on_frontier,
                    weight,
                }
            })
            .collect();

        Self { members }
    }

    /// Members, best first.
    pub fn members(&self) -> &[PoolMember] {
        &self.members
    }

    /// Member ids, best first.
    pub fn ids(&self) -> Vec<PromptId> {
        self.members.iter().map(|m| m.prompt_id).collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Draws parents from a breeding pool.
pub struct ParentSampler<'a> {
    pool: &'a BreedingPool,
    tested: &'a [PromptId],
    exploration_rate: f64,
}

impl<'a> ParentSampler<'a> {
    /// Sample from `pool`, exploring among `tested` at `exploration_rate`.
    pub fn new(pool: &'a BreedingPool, tested: &'a [PromptId], exploration_rate: f64) -> Self {
        Self {
            pool,
            tested,
            exploration_rate: exploration_rate.clamp(0.0, 1.0),
        }
    }

    /// Draw one parent.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<PromptId> {
        self.sample_excluding(rng, None)
    }

    /// Draw two distinct parents, or `None` if only one candidate exists.
    pub fn sample_pair<R: Rng>(&self, rng: &mut R) -> Option<(PromptId, PromptId)> {
        let first = self.sample(rng)?;
        let second = self.sample_excluding(rng, Some(first))?;
        Some((first, second))
    }

    fn sample_excluding<R: Rng>(&self, rng: &mut R, exclude: Option<PromptId>) -> Option<PromptId> {
        let explore = !self.tested.is_empty() && rng.gen_bool(self.exploration_rate);
        if explore {
            let candidates: Vec<PromptId> = self
                .tested
                .iter()
                .copied()
                .filter(|id| Some(*id) != exclude)
                .collect();
            if let Some(id) = candidates.choose(rng) {
                return Some(*id);
            }
        }

        let candidates: Vec<&PoolMember> = self
            .pool
            .members
            .iter()
            .filter(|m| Some(m.prompt_id) != exclude)
            .collect();
        let weights = WeightedIndex::new(candidates.iter().map(|m| m.weight)).ok()?;
        Some(candidates[weights.sample(rng)].prompt_id)
    }
}
