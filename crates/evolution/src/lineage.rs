//! Human-readable lineage names.
//!
//! Seeds are called `Genesis` (`Genesis-2`, `Genesis-3`, ... when several
//! are supplied). Children are named `G{generation}{tag}{nn} from {base}`,
//! where the tag is the operator letter, `nn` counts prompts named in that
//! generation and `base` is the parent's name up to its first ` from `.
//! Crossover children list both bases joined by ` & `.

use promptevo_core::{Generation, OperatorKind};
use std::collections::BTreeMap;

/// Name of the first seed.
pub const GENESIS: &str = "Genesis";

/// Assigns lineage names with a counter per generation.
///
/// Names depend only on the order of calls, so a run that breeds in the
/// same order reproduces the same names.
#[derive(Debug, Clone, Default)]
pub struct LineageNamer {
    counts: BTreeMap<Generation, u32>,
}

impl LineageNamer {
    /// Create a namer with no names issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the `index`-th seed (zero-based).
    pub fn seed(&self, index: usize) -> String {
        if index == 0 {
            GENESIS.to_string()
        } else {
            format!("{}-{}", GENESIS, index + 1)
        }
    }

    /// Name a child of `parents` produced by `operator` in `generation`.
    pub fn child(&mut self, generation: Generation, operator: OperatorKind, parents: &[&str]) -> String {
        let count = self.counts.entry(generation).or_insert(0);
        let bases: Vec<&str> = parents.iter().map(|p| parent_base(p)).collect();
        let name = format!(
            "G{}{}{:02} from {}",
            generation,
            operator.tag(),
            count,
            bases.join(" & ")
        );
        *count += 1;
        name
    }

    /// Names issued so far in `generation`.
    pub fn issued(&self, generation: Generation) -> u32 {
        self.counts.get(&generation).copied().unwrap_or(0)
    }
}

/// Part of a lineage name before its parent chain.
pub fn parent_base(name: &str) -> &str {
    name.split_once(" from ").map_or(name, |(base, _)| base).trim()
}
