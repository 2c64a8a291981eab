//! Pareto selection over fitness records.

use promptevo_core::{FitnessRecord, PromptId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Whether objective vector `a` dominates `b`.
///
/// `a` dominates `b` when it is at least as good on every objective and
/// strictly better on at least one. Vectors of different length never
/// dominate each other.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y || x.is_nan() || y.is_nan() {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Non-dominated records.
///
/// Ordered by objective vector, best first, with equal vectors ordered by
/// prompt id. With a single objective the frontier is the one best record,
/// ties broken by [`FitnessRecord::rank_cmp`].
pub fn frontier<'a>(records: &[&'a FitnessRecord]) -> Vec<&'a FitnessRecord> {
    let dimensions = records.iter().map(|r| r.objectives.len()).max().unwrap_or(0);
    if dimensions <= 1 {
        return records
            .iter()
            .copied()
            .min_by(|a, b| single_objective_cmp(a, b))
            .into_iter()
            .collect();
    }

    let mut members: Vec<&FitnessRecord> = records
        .iter()
        .copied()
        .filter(|candidate| {
            !records
                .iter()
                .any(|other| dominates(&other.objectives, &candidate.objectives))
        })
        .collect();
    members.sort_by(|a, b| vector_cmp(a, b));
    members
}

/// How many records dominate each record.
///
/// Frontier members have a count of zero.
pub fn domination_counts(records: &[&FitnessRecord]) -> BTreeMap<PromptId, usize> {
    records
        .iter()
        .map(|record| {
            let count = records
                .iter()
                .filter(|other| dominates(&other.objectives, &record.objectives))
                .count();
            (record.prompt_id, count)
        })
        .collect()
}

fn single_objective_cmp(a: &FitnessRecord, b: &FitnessRecord) -> Ordering {
    let value = |r: &FitnessRecord| r.objectives.first().copied().unwrap_or(r.fitness);
    value(b).total_cmp(&value(a)).then_with(|| a.rank_cmp(b))
}

/// Objective vectors descending, then prompt id.
fn vector_cmp(a: &FitnessRecord, b: &FitnessRecord) -> Ordering {
    for (x, y) in a.objectives.iter().zip(&b.objectives) {
        match y.total_cmp(x) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    b.objectives
        .len()
        .cmp(&a.objectives.len())
        .then_with(|| a.prompt_id.cmp(&b.prompt_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(objectives: &[f64]) -> FitnessRecord {
        FitnessRecord {
            prompt_id: PromptId::new(),
            prompt_generation: 0,
            evaluated_in: 0,
            fitness: objectives[0],
            objectives: objectives.to_vec(),
            scored: 3,
            failed: 0,
            low_confidence: false,
        }
    }

    fn ids(records: &[&FitnessRecord]) -> Vec<PromptId> {
        records.iter().map(|r| r.prompt_id).collect()
    }

    #[test]
    fn test_dominance() {
        assert!(dominates(&[0.6, 0.8], &[0.4, 0.7]));
        assert!(dominates(&[0.6, 0.8], &[0.6, 0.7]));
        assert!(!dominates(&[0.6, 0.8], &[0.6, 0.8]));
        assert!(!dominates(&[0.5, 0.9], &[0.3, 0.95]));
        assert!(!dominates(&[0.5], &[0.3, 0.95]));
    }

    #[test]
    fn test_tradeoff_both_on_frontier() {
        let a = record(&[0.5, 0.9]);
        let b = record(&[0.3, 0.95]);

        let front = frontier(&[&b, &a]);
        assert_eq!(ids(&front), vec![a.prompt_id, b.prompt_id]);
    }

    #[test]
    fn test_dominated_record_excluded() {
        let a = record(&[0.6, 0.8]);
        let b = record(&[0.4, 0.7]);

        let front = frontier(&[&a, &b]);
        assert_eq!(ids(&front), vec![a.prompt_id]);

        let counts = domination_counts(&[&a, &b]);
        assert_eq!(counts[&a.prompt_id], 0);
        assert_eq!(counts[&b.prompt_id], 1);
    }

    #[test]
    fn test_equal_vectors_ordered_by_id() {
        let records: Vec<FitnessRecord> = (0..5).map(|_| record(&[0.2, -0.1])).collect();
        let refs: Vec<&FitnessRecord> = records.iter().rev().collect();

        let front = frontier(&refs);
        let mut expected: Vec<PromptId> = records.iter().map(|r| r.prompt_id).collect();
        expected.sort();
        assert_eq!(ids(&front), expected);
    }

    #[test]
    fn test_frontier_is_deterministic() {
        let records: Vec<FitnessRecord> = [
            [0.1, 0.4],
            [0.4, 0.1],
            [0.2, 0.2],
            [0.3, 0.3],
            [0.0, 0.5],
            [0.3, 0.3],
        ]
        .iter()
        .map(|v| record(v))
        .collect();
        let forward: Vec<&FitnessRecord> = records.iter().collect();
        let backward: Vec<&FitnessRecord> = records.iter().rev().collect();

        let first = ids(&frontier(&forward));
        assert_eq!(first, ids(&frontier(&forward)));
        assert_eq!(first, ids(&frontier(&backward)));

        // nothing on the frontier is dominated by anything in the input
        for member in frontier(&forward) {
            assert!(records.iter().all(|r| !dominates(&r.objectives, &member.objectives)));
        }
        // [0.2, 0.2] is dominated by [0.3, 0.3]
        assert!(!first.contains(&records[2].prompt_id));
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_single_objective_picks_best_with_tie_break() {
        let mut fewer_failures = record(&[0.5]);
        fewer_failures.failed = 0;
        let mut more_failures = record(&[0.5]);
        more_failures.failed = 2;
        let worse = record(&[0.1]);

        let front = frontier(&[&more_failures, &worse, &fewer_failures]);
        assert_eq!(ids(&front), vec![fewer_failures.prompt_id]);
    }

    #[test]
    fn test_empty_input() {
        assert!(frontier(&[]).is_empty());
        assert!(domination_counts(&[]).is_empty());
    }
}
