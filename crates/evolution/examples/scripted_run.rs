//! Dry run of the optimizer against scripted collaborators.
//!
//! ```text
//! RUST_LOG=promptevo_evolution=debug cargo run -p promptevo-evolution --example scripted_run
//! ```

use promptevo_collab::{Collaborators, ScriptedGenerator, ScriptedScorer, ScriptedSimulator};
use promptevo_core::Persona;
use promptevo_evolution::{OptimizerConfig, PopulationManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let personas = vec![
        Persona::new("anxious-student", "Sam").with_profile(serde_json::json!({
            "concern": "exam stress",
            "openness": "low"
        })),
        Persona::new("new-manager", "Robin").with_profile(serde_json::json!({
            "concern": "first team conflict",
            "openness": "high"
        })),
        Persona::new("career-changer", "Kai").with_profile(serde_json::json!({
            "concern": "leaving a stable job",
            "openness": "medium"
        })),
    ];

    let collaborators = Collaborators::new(
        Arc::new(ScriptedSimulator::new()),
        Arc::new(
            ScriptedScorer::new(3.0)
                .with_keyword("listen", 0.6)
                .with_keyword("question", 0.4)
                .with_keyword("step", 0.3)
                .with_gain("anxious-student", 1.5),
        ),
        Arc::new(ScriptedGenerator::cycling([
            "The coach rarely asks about the client's own goals.",
            "You are a patient coach who will listen first and ask one open question at a time.",
            "You are a practical coach who breaks every goal into one small step.",
            "You are a coach who will listen, ask a clarifying question, then agree on a next step.",
        ])),
    );

    let config = OptimizerConfig::new()
        .with_generations(4)
        .with_children(4)
        .with_call_timeout(Duration::from_secs(10))
        .with_rng_seed(7);

    let seeds = vec![
        "You are a supportive life coach.".to_string(),
        "You are a direct coach focused on results.".to_string(),
    ];

    let mut manager = PopulationManager::new(config, collaborators, personas, seeds)?;
    let report = manager.run().await?;

    if let Some(halt) = report.halt {
        info!("Stopped: {}", halt);
    }
    for summary in &report.summaries {
        println!(
            "generation {}: evaluated {}, best {}, frontier {}",
            summary.generation,
            summary.evaluated,
            summary
                .best_fitness
                .map(|f| format!("{:+.3}", f))
                .unwrap_or_else(|| "n/a".to_string()),
            summary.frontier.len()
        );
    }
    for prompt in report.frontier_prompts() {
        println!("frontier  {:<28} {}", prompt.lineage(), prompt.text());
    }
    if let Some(best) = report.best_prompt() {
        println!("best      {:<28} {}", best.lineage(), best.text());
    }
    Ok(())
}
