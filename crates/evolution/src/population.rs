//! Append-only prompt store and fitness ledger.

use crate::error::PopulationError;
use promptevo_core::{EvaluationResult, FitnessRecord, Generation, Prompt, PromptId};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Every prompt created during a run, in creation order.
///
/// The store never shrinks. Insertion enforces that generations do not
/// decrease in creation order and that every parent exists with a strictly
/// smaller generation.
#[derive(Debug, Clone, Default)]
pub struct Population {
    prompts: Vec<Prompt>,
    index: HashMap<PromptId, usize>,
    by_generation: BTreeMap<Generation, Vec<PromptId>>,
    children: HashMap<PromptId, Vec<PromptId>>,
}

impl Population {
    /// Create an empty population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prompt, checking genealogy invariants.
    pub fn insert(&mut self, prompt: Prompt) -> Result<PromptId, PopulationError> {
        let id = prompt.id();
        if self.index.contains_key(&id) {
            return Err(PopulationError::DuplicateId(id));
        }
        if let Some(latest) = self.latest_generation() {
            if prompt.generation() < latest {
                return Err(PopulationError::GenerationRegression {
                    id,
                    generation: prompt.generation(),
                    latest,
                });
            }
        }

        let parents = prompt.parents();
        for parent in &parents {
            let Some(stored) = self.get(*parent) else {
                return Err(PopulationError::UnknownParent {
                    child: id,
                    parent: *parent,
                });
            };
            if stored.generation() >= prompt.generation() {
                return Err(PopulationError::ParentNotEarlier {
                    child: id,
                    child_generation: prompt.generation(),
                    parent: *parent,
                    parent_generation: stored.generation(),
                });
            }
        }

        for parent in parents {
            let siblings = self.children.entry(parent).or_default();
            if !siblings.contains(&id) {
                siblings.push(id);
            }
        }
        self.by_generation.entry(prompt.generation()).or_default().push(id);
        self.index.insert(id, self.prompts.len());
        self.prompts.push(prompt);
        Ok(id)
    }

    /// Look up a prompt.
    pub fn get(&self, id: PromptId) -> Option<&Prompt> {
        self.index.get(&id).map(|&i| &self.prompts[i])
    }

    /// Whether the prompt is stored.
    pub fn contains(&self, id: PromptId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of prompts.
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompts in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.iter()
    }

    /// Prompts of one generation, in creation order.
    pub fn generation(&self, generation: Generation) -> Vec<&Prompt> {
        self.by_generation
            .get(&generation)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    /// Highest generation stored.
    pub fn latest_generation(&self) -> Option<Generation> {
        self.prompts.last().map(|p| p.generation())
    }

    /// Direct children of a prompt, in creation order.
    pub fn children_of(&self, id: PromptId) -> Vec<&Prompt> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.get(*c)).collect())
            .unwrap_or_default()
    }

    /// Every ancestor of a prompt, nearest first, each listed once.
    pub fn ancestry(&self, id: PromptId) -> Vec<&Prompt> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<PromptId> = self
            .get(id)
            .map(|p| p.parents().into_iter().collect())
            .unwrap_or_default();
        let mut ancestors = Vec::new();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(prompt) = self.get(next) {
                queue.extend(prompt.parents());
                ancestors.push(prompt);
            }
        }
        ancestors
    }

    /// Owned copy of every prompt, in creation order.
    pub fn snapshot(&self) -> Vec<Prompt> {
        self.prompts.clone()
    }
}

/// Fitness records and raw evaluation results, keyed by prompt.
#[derive(Debug, Clone, Default)]
pub struct FitnessLedger {
    records: BTreeMap<PromptId, Vec<FitnessRecord>>,
    results: BTreeMap<PromptId, Vec<EvaluationResult>>,
    censored: BTreeMap<PromptId, Vec<Generation>>,
}

impl FitnessLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one panel's results and its record, if any.
    ///
    /// A prompt without a record is remembered as censored for
    /// `generation`.
    pub fn record_panel(
        &mut self,
        prompt_id: PromptId,
        generation: Generation,
        results: Vec<EvaluationResult>,
        record: Option<FitnessRecord>,
    ) -> Result<(), PopulationError> {
        let existing = self.records.get(&prompt_id);
        if existing.is_some_and(|records| records.iter().any(|r| r.evaluated_in == generation)) {
            return Err(PopulationError::DuplicateRecord {
                prompt: prompt_id,
                generation,
            });
        }

        self.results.entry(prompt_id).or_default().extend(results);
        match record {
            Some(record) => self.records.entry(prompt_id).or_default().push(record),
            None => self.censored.entry(prompt_id).or_default().push(generation),
        }
        Ok(())
    }

    /// Whether a prompt has at least one record.
    pub fn is_tested(&self, prompt_id: PromptId) -> bool {
        self.records.contains_key(&prompt_id)
    }

    /// Whether a prompt was ever evaluated, scored or not.
    pub fn was_evaluated(&self, prompt_id: PromptId) -> bool {
        self.results.contains_key(&prompt_id)
    }

    /// Most recent record of a prompt.
    pub fn latest(&self, prompt_id: PromptId) -> Option<&FitnessRecord> {
        self.records
            .get(&prompt_id)
            .and_then(|records| records.iter().max_by_key(|r| r.evaluated_in))
    }

    /// Most recent record of every tested prompt, ordered by prompt id.
    pub fn latest_records(&self) -> Vec<&FitnessRecord> {
        self.records
            .keys()
            .filter_map(|id| self.latest(*id))
            .collect()
    }

    /// Every record, ordered by prompt id then evaluation generation.
    pub fn all_records(&self) -> Vec<&FitnessRecord> {
        self.records.values().flatten().collect()
    }

    /// Records produced in one evaluation generation.
    pub fn records_in(&self, generation: Generation) -> Vec<&FitnessRecord> {
        self.records
            .values()
            .flatten()
            .filter(|r| r.evaluated_in == generation)
            .collect()
    }

    /// Evaluation results of a prompt across all its evaluations.
    pub fn results(&self, prompt_id: PromptId) -> &[EvaluationResult] {
        self.results.get(&prompt_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Prompts censored in `generation`.
    pub fn censored_in(&self, generation: Generation) -> Vec<PromptId> {
        self.censored
            .iter()
            .filter(|(_, generations)| generations.contains(&generation))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Mean per-criterion improvement over a prompt's scored results
    /// from its latest evaluation.
    pub fn criteria(&self, prompt_id: PromptId) -> BTreeMap<String, f64> {
        let Some(latest) = self.latest(prompt_id) else {
            return BTreeMap::new();
        };

        let mut sums: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for result in self.results(prompt_id) {
            if result.generation != latest.evaluated_in {
                continue;
            }
            let Some(outcome) = result.scored_outcome() else {
                continue;
            };
            for name in outcome.final_score.criteria.keys() {
                if let Some(delta) = outcome.criterion_improvement(name) {
                    sums.entry(name.clone()).or_default().push(delta);
                }
            }
        }

        sums.into_iter()
            .map(|(name, mut deltas)| {
                deltas.sort_by(f64::total_cmp);
                let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
                (name, mean)
            })
            .collect()
    }
}
