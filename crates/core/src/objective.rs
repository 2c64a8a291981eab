//! Objectives tracked for Pareto selection.

use crate::evaluation::ScoredOutcome;
use serde::{Deserialize, Serialize};

/// A measurable objective over a prompt's scored panel.
///
/// Every objective is oriented so that higher is better.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Mean improvement across personas
    MeanImprovement,
    /// Negative population variance of improvement
    Consistency,
    /// Smallest improvement across personas
    WorstCase,
    /// Share of personas whose score went up
    SuccessRate,
    /// Mean improvement on one questionnaire criterion
    Criterion(String),
}

impl Objective {
    /// Measure this objective over scored outcomes.
    ///
    /// Values are sorted before they are summed so the result does not
    /// depend on the order outcomes arrived in. Returns 0.0 for an empty
    /// panel.
    pub fn measure(&self, outcomes: &[&ScoredOutcome]) -> f64 {
        match self {
            Objective::MeanImprovement => mean(improvements(outcomes)),
            Objective::Consistency => -variance(improvements(outcomes)),
            Objective::WorstCase => improvements(outcomes)
                .into_iter()
                .reduce(f64::min)
                .unwrap_or(0.0),
            Objective::SuccessRate => {
                if outcomes.is_empty() {
                    return 0.0;
                }
                let improved = outcomes.iter().filter(|o| o.improvement > 0.0).count();
                improved as f64 / outcomes.len() as f64
            }
            Objective::Criterion(name) => mean(
                outcomes
                    .iter()
                    .filter_map(|o| o.criterion_improvement(name))
                    .collect(),
            ),
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Objective::MeanImprovement => "mean_improvement".to_string(),
            Objective::Consistency => "consistency".to_string(),
            Objective::WorstCase => "worst_case".to_string(),
            Objective::SuccessRate => "success_rate".to_string(),
            Objective::Criterion(name) => format!("criterion:{}", name),
        }
    }
}

fn improvements(outcomes: &[&ScoredOutcome]) -> Vec<f64> {
    outcomes.iter().map(|o| o.improvement).collect()
}

fn mean(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let m = values.iter().sum::<f64>() / values.len() as f64;
    let mut squares: Vec<f64> = values.iter().map(|v| (v - m) * (v - m)).collect();
    squares.sort_by(f64::total_cmp);
    squares.iter().sum::<f64>() / values.len() as f64
}
