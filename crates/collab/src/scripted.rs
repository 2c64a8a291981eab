//! Deterministic in-process collaborators.
//!
//! These stand in for the real dialogue, scoring and language services in
//! dry runs and tests. Their behaviour is fully determined by how they are
//! built, so an optimization run against them is reproducible.

use async_trait::async_trait;
use promptevo_core::{Persona, PersonaId, Score, Speaker, Transcript};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::traits::{DialogueSimulator, Scorer, TextGenerator};

/// Simulator that echoes the instruction back as the coach's side.
#[derive(Debug, Default)]
pub struct ScriptedSimulator {
    failing: BTreeSet<PersonaId>,
}

impl ScriptedSimulator {
    /// Create a simulator that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every simulation with this persona fail.
    pub fn failing_for(mut self, persona: impl Into<PersonaId>) -> Self {
        self.failing.insert(persona.into());
        self
    }
}

#[async_trait]
impl DialogueSimulator for ScriptedSimulator {
    async fn simulate(
        &self,
        system_instruction: &str,
        persona: &Persona,
        turn_budget: usize,
    ) -> Result<Transcript, anyhow::Error> {
        if self.failing.contains(&persona.id) {
            anyhow::bail!("simulation unavailable for persona {}", persona.id);
        }

        let mut transcript = Transcript::new();
        for round in 1..=turn_budget {
            transcript.push(Speaker::Coach, format!("[{}] {}", round, system_instruction));
            transcript.push(Speaker::Persona, format!("{} replies (round {})", persona.name, round));
        }
        Ok(transcript)
    }
}

/// Scorer that rewards keywords appearing on the coach's side.
///
/// The baseline is fixed per persona. The post-conversation score adds the
/// weight of every configured keyword the coach used, scaled by the
/// persona's gain. Each keyword is also reported as a criterion.
#[derive(Debug, Clone)]
pub struct ScriptedScorer {
    baseline: f64,
    baselines: BTreeMap<PersonaId, f64>,
    gains: BTreeMap<PersonaId, f64>,
    keywords: Vec<(String, f64)>,
}

impl ScriptedScorer {
    /// Create a scorer with a shared baseline.
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline,
            baselines: BTreeMap::new(),
            gains: BTreeMap::new(),
            keywords: Vec::new(),
        }
    }

    /// Reward a keyword.
    pub fn with_keyword(mut self, keyword: impl Into<String>, weight: f64) -> Self {
        self.keywords.push((keyword.into().to_lowercase(), weight));
        self
    }

    /// Override the baseline of one persona.
    pub fn with_baseline(mut self, persona: impl Into<PersonaId>, baseline: f64) -> Self {
        self.baselines.insert(persona.into(), baseline);
        self
    }

    /// Scale one persona's response to keywords.
    pub fn with_gain(mut self, persona: impl Into<PersonaId>, gain: f64) -> Self {
        self.gains.insert(persona.into(), gain);
        self
    }

    fn baseline_for(&self, persona: &PersonaId) -> f64 {
        self.baselines.get(persona).copied().unwrap_or(self.baseline)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(
        &self,
        persona: &Persona,
        transcript: Option<&Transcript>,
    ) -> Result<Score, anyhow::Error> {
        let baseline = self.baseline_for(&persona.id);
        let Some(transcript) = transcript else {
            let mut score = Score::new(baseline);
            for (keyword, _) in &self.keywords {
                score.criteria.insert(keyword.clone(), baseline);
            }
            return Ok(score);
        };

        let coach_text = transcript
            .turns
            .iter()
            .filter(|t| t.speaker == Speaker::Coach)
            .map(|t| t.message.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let gain = self.gains.get(&persona.id).copied().unwrap_or(1.0);

        let mut score = Score::new(baseline);
        for (keyword, weight) in &self.keywords {
            let delta = if coach_text.contains(keyword.as_str()) {
                weight * gain
            } else {
                0.0
            };
            score.value += delta;
            score.criteria.insert(keyword.clone(), baseline + delta);
        }
        Ok(score)
    }
}

/// What the generator does once its queued replies run out.
#[derive(Debug)]
enum Fallback {
    Fail,
    Cycle(Vec<String>),
}

/// Generator that replays queued replies, then falls back.
#[derive(Debug)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<String>>,
    fallback: Fallback,
    cursor: AtomicUsize,
}

impl ScriptedGenerator {
    /// Replay `replies` in order, then fail every call.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
            fallback: Fallback::Fail,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Answer every call with the next entry of `texts`, wrapping around.
    pub fn cycling<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fallback: Fallback::Cycle(texts.into_iter().map(Into::into).collect()),
            ..Self::failing()
        }
    }

    /// Queue a failure before any remaining replies are used.
    pub async fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &str) -> Result<String, anyhow::Error> {
        self.requests.lock().await.push(request.to_string());

        if let Some(reply) = self.replies.lock().await.pop_front() {
            return reply.map_err(|message| anyhow::anyhow!(message));
        }

        match &self.fallback {
            Fallback::Fail => anyhow::bail!("language generation unavailable"),
            Fallback::Cycle(texts) if !texts.is_empty() => {
                let index = self.cursor.fetch_add(1, Ordering::SeqCst) % texts.len();
                Ok(texts[index].clone())
            }
            Fallback::Cycle(_) => anyhow::bail!("no scripted replies configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulator_produces_two_turns_per_round() {
        let simulator = ScriptedSimulator::new();
        let persona = Persona::new("p1", "Avery");

        let transcript = simulator.simulate("You are a coach.", &persona, 3).await.unwrap();
        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript.turns[0].speaker, Speaker::Coach);
    }

    #[tokio::test]
    async fn test_simulator_failing_persona() {
        let simulator = ScriptedSimulator::new().failing_for("p2");
        let persona = Persona::new("p2", "Blair");
        assert!(simulator.simulate("You are a coach.", &persona, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_scorer_rewards_keywords() {
        let scorer = ScriptedScorer::new(2.0)
            .with_keyword("listen", 0.5)
            .with_keyword("breathe", 0.25)
            .with_gain("p1", 2.0);
        let persona = Persona::new("p1", "Avery");

        let mut transcript = Transcript::new();
        transcript.push(Speaker::Coach, "You are a coach who will LISTEN carefully.");
        transcript.push(Speaker::Persona, "breathe");

        let baseline = scorer.score(&persona, None).await.unwrap();
        let post = scorer.score(&persona, Some(&transcript)).await.unwrap();

        assert_eq!(baseline.value, 2.0);
        assert_eq!(post.value, 3.0);
        assert_eq!(post.criteria.get("breathe"), Some(&2.0));
    }

    #[tokio::test]
    async fn test_generator_replays_then_fails() {
        let generator = ScriptedGenerator::new(["You are kind."]);
        assert_eq!(generator.generate("first").await.unwrap(), "You are kind.");
        assert!(generator.generate("second").await.is_err());
        assert_eq!(generator.requests().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_generator_cycles() {
        let generator = ScriptedGenerator::cycling(["a", "b"]);
        generator.push_failure("boom").await;

        assert!(generator.generate("x").await.is_err());
        assert_eq!(generator.generate("x").await.unwrap(), "a");
        assert_eq!(generator.generate("x").await.unwrap(), "b");
        assert_eq!(generator.generate("x").await.unwrap(), "a");
    }
}
