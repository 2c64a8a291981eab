//! Builds the analysis requests sent to the text generator.

use promptevo_core::{EvaluationResult, Prompt, ReflectionNote, ScoredOutcome};

/// Criteria listed per side in a reflection request.
const CRITERIA_SHOWN: usize = 3;

/// Request asking for a critique of one conversation.
pub fn reflection_request(prompt: &Prompt, outcome: &ScoredOutcome, persona: &str, max_chars: usize) -> String {
    let mut request = format!(
        "You are reviewing how a coaching system prompt performed in one simulated conversation.\n\n\
         SYSTEM PROMPT: \"{}\"\n\
         PERSONA: {}\n\
         SELF-ASSESSMENT: {:.3} before, {:.3} after ({:+.3})\n",
        prompt.text(),
        persona,
        outcome.baseline.value,
        outcome.final_score.value,
        outcome.improvement,
    );

    let (improved, declined) = criterion_movers(outcome);
    if !improved.is_empty() {
        request.push_str(&format!("IMPROVED MOST: {}\n", improved.join(", ")));
    }
    if !declined.is_empty() {
        request.push_str(&format!("IMPROVED LEAST: {}\n", declined.join(", ")));
    }

    request.push_str("\nCONVERSATION:\n");
    request.push_str(&outcome.transcript.render(max_chars));
    request.push_str(
        "\n\nDescribe what in the system prompt helped or hindered this persona. \
         Be specific and brief.",
    );
    request
}

/// Request asking for a summary across the whole panel.
pub fn synthesis_request(
    prompt: &Prompt,
    evaluations: &[EvaluationResult],
    reflections: &[ReflectionNote],
) -> String {
    let scored: Vec<f64> = evaluations.iter().filter_map(|e| e.improvement()).collect();
    let failed = evaluations.len() - scored.len();

    let mut request = format!(
        "You are summarising how a coaching system prompt performed across a panel of personas.\n\n\
         SYSTEM PROMPT: \"{}\"\n\
         GENERATION: {}\n\
         RESULTS: {} scored, {} failed\n",
        prompt.text(),
        prompt.generation(),
        scored.len(),
        failed,
    );

    for evaluation in evaluations {
        match evaluation.improvement() {
            Some(delta) => request.push_str(&format!("- {}: {:+.3}\n", evaluation.persona_id, delta)),
            None => request.push_str(&format!("- {}: no result\n", evaluation.persona_id)),
        }
    }

    let critiques: Vec<&ReflectionNote> = reflections.iter().filter(|n| !n.degraded).collect();
    if !critiques.is_empty() {
        request.push_str("\nPER-CONVERSATION NOTES:\n");
        for note in critiques {
            request.push_str(&format!("[{}] {}\n", note.persona_id, note.text.trim()));
        }
    }

    request.push_str(
        "\nSummarise what works, what does not, and what the next version of the \
         prompt should change.",
    );
    request
}

/// Criteria with the largest and smallest improvement.
fn criterion_movers(outcome: &ScoredOutcome) -> (Vec<String>, Vec<String>) {
    let mut deltas: Vec<(&str, f64)> = outcome
        .final_score
        .criteria
        .keys()
        .filter_map(|name| {
            outcome
                .criterion_improvement(name)
                .map(|delta| (name.as_str(), delta))
        })
        .collect();
    if deltas.is_empty() {
        return (Vec::new(), Vec::new());
    }

    deltas.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let shown = CRITERIA_SHOWN.min(deltas.len());
    let format = |(name, delta): &(&str, f64)| format!("{}: {:+.3}", name, delta);

    let improved = deltas[..shown].iter().map(format).collect();
    let declined = deltas[deltas.len() - shown..].iter().rev().map(format).collect();
    (improved, declined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptevo_core::{PersonaId, Score, Speaker, Transcript};

    fn outcome() -> ScoredOutcome {
        let mut transcript = Transcript::new();
        transcript.push(Speaker::Coach, "How are you feeling today?");
        transcript.push(Speaker::Persona, "A bit nervous.");
        ScoredOutcome::new(
            Score::new(2.0)
                .with_criterion("stay_calm", 2.0)
                .with_criterion("listen", 2.0),
            Score::new(2.5)
                .with_criterion("stay_calm", 3.0)
                .with_criterion("listen", 1.5),
            transcript,
        )
    }

    #[test]
    fn test_reflection_request_contents() {
        let prompt = Prompt::seed("Genesis", "You are a patient coach.");
        let request = reflection_request(&prompt, &outcome(), "Avery", 1000);

        assert!(request.contains("You are a patient coach."));
        assert!(request.contains("Avery"));
        assert!(request.contains("(+0.500)"));
        assert!(request.contains("IMPROVED MOST: stay_calm: +1.000, listen: -0.500"));
        assert!(request.contains("Persona: A bit nervous."));
    }

    #[test]
    fn test_reflection_request_truncates_transcript() {
        let prompt = Prompt::seed("Genesis", "You are a patient coach.");
        let request = reflection_request(&prompt, &outcome(), "Avery", 10);

        assert!(request.contains("[transcript truncated]"));
        assert!(!request.contains("A bit nervous."));
    }

    #[test]
    fn test_synthesis_request_skips_placeholders() {
        let prompt = Prompt::seed("Genesis", "You are a patient coach.");
        let evaluations = vec![
            EvaluationResult::scored(prompt.id(), PersonaId::new("a"), 0, outcome()),
            EvaluationResult::failed(prompt.id(), PersonaId::new("b"), 0, "timeout"),
        ];
        let reflections = vec![
            ReflectionNote::new(prompt.id(), PersonaId::new("a"), 0, "Calm pacing helped."),
            ReflectionNote::placeholder(prompt.id(), PersonaId::new("b"), 0),
        ];

        let request = synthesis_request(&prompt, &evaluations, &reflections);
        assert!(request.contains("1 scored, 1 failed"));
        assert!(request.contains("- b: no result"));
        assert!(request.contains("[a] Calm pacing helped."));
        assert!(!request.contains("no analysis available"));
    }
}
