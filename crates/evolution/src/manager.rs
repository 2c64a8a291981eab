//! Population manager - drives the generational search.
//!
//! ```text
//! Seeded → Evaluating → Reflecting → Selecting → Breeding → Evaluating(g+1) … → Terminal
//! ```
//!
//! The manager is the only writer of the population, the fitness ledger
//! and the note log. Concurrent work inside a state writes into per-call
//! results that are merged back sequentially once the state's join
//! completes.

use crate::error::{OptimizerError, PopulationError, Result};
use crate::lineage::LineageNamer;
use crate::metrics::{BreedingStatistics, GenerationSummary};
use crate::operators::{GeneticOperators, Offspring, ParentContext};
use crate::pareto;
use crate::population::{FitnessLedger, Population};
use crate::report::{HaltReason, NoopSink, OptimizationReport, ReportSink};
use crate::selection::{BreedingPool, ParentSampler};
use crate::validation::ChildValidator;
use crate::{ConfigError, OptimizerConfig};
use futures::future::join_all;
use promptevo_collab::{CallGate, Collaborators};
use promptevo_core::{
    EvaluationResult, Generation, NoteLog, OperatorKind, Origin, Persona, Prompt, PromptId,
};
use promptevo_execution::{CollaboratorEvaluator, EvaluationAdapter, FitnessAggregator};
use promptevo_reflection::ReflectionEngine;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where the generation state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// Seeds stored, nothing evaluated yet
    Seeded,
    /// Generation is next to be, or being, evaluated
    Evaluating(Generation),
    /// Writing notes for the generation's evaluated prompts
    Reflecting(Generation),
    /// Computing the frontier and breeding pool
    Selecting(Generation),
    /// Producing children for the following generation
    Breeding(Generation),
    /// No further generations will run
    Terminal(HaltReason),
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationState::Seeded => write!(f, "seeded"),
            GenerationState::Evaluating(g) => write!(f, "evaluating generation {}", g),
            GenerationState::Reflecting(g) => write!(f, "reflecting on generation {}", g),
            GenerationState::Selecting(g) => write!(f, "selecting from generation {}", g),
            GenerationState::Breeding(g) => write!(f, "breeding from generation {}", g),
            GenerationState::Terminal(reason) => write!(f, "terminal ({})", reason),
        }
    }
}

/// Owns the population and runs generations.
pub struct PopulationManager {
    config: OptimizerConfig,
    personas: Vec<Persona>,
    aggregator: FitnessAggregator,
    reflection: ReflectionEngine,
    operators: GeneticOperators,
    sink: Arc<dyn ReportSink>,
    gate: CallGate,
    population: Population,
    ledger: FitnessLedger,
    notes: NoteLog,
    namer: LineageNamer,
    rng: StdRng,
    state: GenerationState,
    generation: Generation,
    pending_reevaluation: BTreeSet<PromptId>,
    summaries: Vec<GenerationSummary>,
    started: Option<Instant>,
}

impl PopulationManager {
    /// Validate the configuration and store the seeds.
    ///
    /// Fails before any collaborator is called.
    pub fn new(
        config: OptimizerConfig,
        collaborators: Collaborators,
        personas: Vec<Persona>,
        seeds: Vec<String>,
    ) -> Result<Self> {
        config.validate(&personas, &seeds)?;

        let capacity =
            NonZeroUsize::new(config.max_concurrent_calls).ok_or(ConfigError::ZeroConcurrency)?;
        let gate = CallGate::new(capacity, config.call_policy());

        let evaluator = CollaboratorEvaluator::new(
            collaborators.simulator,
            collaborators.scorer,
            gate.clone(),
            config.turn_budget,
        );
        let aggregator =
            FitnessAggregator::new(Arc::new(evaluator)).with_config(config.aggregation());
        let reflection = ReflectionEngine::new(collaborators.generator.clone(), gate.clone())
            .with_config(config.reflection.clone());
        let operators = GeneticOperators::new(collaborators.generator, gate.clone())
            .with_attempts(config.operator_attempts);

        let namer = LineageNamer::new();
        let mut population = Population::new();
        for (index, text) in seeds.iter().enumerate() {
            population.insert(Prompt::seed(namer.seed(index), text.trim()))?;
        }

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "Seeded {} prompt(s) against {} persona(s), {} generation(s)",
            population.len(),
            personas.len(),
            config.generations
        );

        Ok(Self {
            config,
            personas,
            aggregator,
            reflection,
            operators,
            sink: Arc::new(NoopSink),
            gate,
            population,
            ledger: FitnessLedger::new(),
            notes: NoteLog::new(),
            namer,
            rng,
            state: GenerationState::Seeded,
            generation: 0,
            pending_reevaluation: BTreeSet::new(),
            summaries: Vec::new(),
            started: None,
        })
    }

    /// Replace the structural validator for generated children.
    pub fn with_validator(mut self, validator: ChildValidator) -> Self {
        self.operators = self.operators.with_validator(validator);
        self
    }

    /// Send summaries and the final report to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Evaluate through `adapter` instead of the collaborator evaluator.
    pub fn with_adapter(mut self, adapter: Arc<dyn EvaluationAdapter>) -> Self {
        self.aggregator = FitnessAggregator::new(adapter).with_config(self.config.aggregation());
        self
    }

    /// Current state.
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Whether no further generation will run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, GenerationState::Terminal(_))
    }

    /// Current generation number.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Every prompt created so far.
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Fitness records and evaluation results.
    pub fn ledger(&self) -> &FitnessLedger {
        &self.ledger
    }

    /// Reflection and synthesis notes.
    pub fn notes(&self) -> &NoteLog {
        &self.notes
    }

    /// Summaries of completed generations.
    pub fn summaries(&self) -> &[GenerationSummary] {
        &self.summaries
    }

    /// The shared collaborator gate.
    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    /// Current Pareto frontier over every tested prompt.
    pub fn frontier(&self) -> Vec<&Prompt> {
        let records = self.ledger.latest_records();
        pareto::frontier(&records)
            .iter()
            .filter_map(|r| self.population.get(r.prompt_id))
            .collect()
    }

    /// Best tested prompt by fitness.
    pub fn best(&self) -> Option<&Prompt> {
        self.ledger
            .latest_records()
            .into_iter()
            .min_by(|a, b| a.rank_cmp(b))
            .and_then(|r| self.population.get(r.prompt_id))
    }

    /// Queue an already-stored prompt for evaluation in the next generation.
    pub fn request_reevaluation(&mut self, id: PromptId) -> Result<()> {
        if !self.population.contains(id) {
            return Err(PopulationError::UnknownPrompt(id).into());
        }
        self.pending_reevaluation.insert(id);
        Ok(())
    }

    /// Run generations until the machine terminates.
    pub async fn run(&mut self) -> Result<OptimizationReport> {
        while !self.is_terminal() {
            self.run_generation().await?;
        }
        Ok(self.report())
    }

    /// Run one generation through evaluation, reflection, selection and,
    /// unless a budget is exhausted, breeding.
    pub async fn run_generation(&mut self) -> Result<GenerationSummary> {
        if self.is_terminal() {
            return Err(OptimizerError::Terminal);
        }
        let span = info_span!("generation", number = self.generation);
        self.step().instrument(span).await
    }

    /// Read-only snapshot of everything produced so far.
    pub fn report(&self) -> OptimizationReport {
        let records = self.ledger.latest_records();
        let halt = match self.state {
            GenerationState::Terminal(reason) => Some(reason),
            _ => None,
        };
        // a starved generation stops before selection
        let starved = matches!(halt, Some(HaltReason::Starved { .. }));
        OptimizationReport {
            halt,
            generations_completed: self.summaries.len().saturating_sub(usize::from(starved)),
            population: self.population.snapshot(),
            records: self.ledger.all_records().into_iter().cloned().collect(),
            frontier: pareto::frontier(&records).iter().map(|r| r.prompt_id).collect(),
            best: records.iter().min_by(|a, b| a.rank_cmp(b)).map(|r| r.prompt_id),
            summaries: self.summaries.clone(),
            notes: self.notes.clone(),
        }
    }

    async fn step(&mut self) -> Result<GenerationSummary> {
        let generation = self.generation;
        let step_started = Instant::now();
        let run_started = *self.started.get_or_insert(step_started);
        let mut summary = GenerationSummary {
            generation,
            ..Default::default()
        };

        self.transition(GenerationState::Evaluating(generation));
        let evaluated = self.evaluate(generation, &mut summary).await?;

        if summary.evaluated > 0 && evaluated.is_empty() {
            error!("Every evaluation failed in generation {}, halting", generation);
            let halt = HaltReason::Starved { generation };
            return Ok(self.finish(summary, step_started, Some(halt)).await);
        }

        self.transition(GenerationState::Reflecting(generation));
        self.reflect(generation, evaluated, &mut summary).await;

        self.transition(GenerationState::Selecting(generation));
        let (pool, tested) = {
            let records = self.ledger.latest_records();
            let pool = BreedingPool::build(&records, &self.config.breeding);
            summary.frontier = pareto::frontier(&records).iter().map(|r| r.prompt_id).collect();
            if let Some(best) = records.iter().min_by(|a, b| a.rank_cmp(b)) {
                summary.best_fitness = Some(best.fitness);
                summary.best_prompt = Some(best.prompt_id);
            }
            let tested: Vec<PromptId> = records.iter().map(|r| r.prompt_id).collect();
            (pool, tested)
        };
        summary.breeding_pool = pool.ids();
        info!(
            "Frontier has {} prompt(s), breeding pool {}",
            summary.frontier.len(),
            pool.len()
        );

        if pool.is_empty() {
            error!("No tested prompt to breed from in generation {}, halting", generation);
            let halt = HaltReason::Starved { generation };
            return Ok(self.finish(summary, step_started, Some(halt)).await);
        }

        let halt = if generation + 1 >= self.config.generations {
            Some(HaltReason::GenerationBudget)
        } else if self.wall_clock_exhausted(run_started) {
            Some(HaltReason::WallClock)
        } else {
            None
        };
        if halt.is_some() {
            return Ok(self.finish(summary, step_started, halt).await);
        }

        self.transition(GenerationState::Breeding(generation));
        summary.breeding = self.breed(generation + 1, &pool, &tested).await;
        self.generation = generation + 1;

        Ok(self.finish(summary, step_started, None).await)
    }

    /// Aggregate every untested prompt of `generation` plus queued
    /// re-evaluations. Returns the prompts that received a record.
    async fn evaluate(
        &mut self,
        generation: Generation,
        summary: &mut GenerationSummary,
    ) -> Result<Vec<Prompt>> {
        let mut targets: Vec<Prompt> = self
            .population
            .generation(generation)
            .into_iter()
            .filter(|p| !self.ledger.is_tested(p.id()))
            .cloned()
            .collect();
        for id in std::mem::take(&mut self.pending_reevaluation) {
            if targets.iter().any(|p| p.id() == id) {
                continue;
            }
            if let Some(prompt) = self.population.get(id) {
                debug!("Re-evaluating {}", prompt.lineage());
                targets.push(prompt.clone());
            }
        }

        let panel = self.panel();
        info!(
            "Evaluating {} prompt(s) against {} persona(s)",
            targets.len(),
            panel.len()
        );

        let outcomes = join_all(
            targets
                .iter()
                .map(|prompt| self.aggregator.aggregate(prompt, &panel, generation)),
        )
        .await;

        let mut evaluated = Vec::new();
        for (prompt, outcome) in targets.into_iter().zip(outcomes) {
            summary.evaluated += 1;
            summary.failed_evaluations += outcome.failed();
            let censored = outcome.is_censored();
            if outcome.record.as_ref().is_some_and(|r| r.low_confidence) {
                summary.low_confidence += 1;
            }

            self.ledger
                .record_panel(prompt.id(), generation, outcome.results, outcome.record)?;

            if censored {
                warn!("{} is censored: no persona produced a score", prompt.lineage());
                summary.censored += 1;
            } else {
                evaluated.push(prompt);
            }
        }
        Ok(evaluated)
    }

    /// Personas for this generation, sub-sampled when configured.
    fn panel(&mut self) -> Vec<Persona> {
        match self.config.personas_per_generation {
            Some(n) if n < self.personas.len() => {
                let mut chosen: Vec<Persona> = self
                    .personas
                    .choose_multiple(&mut self.rng, n)
                    .cloned()
                    .collect();
                chosen.sort_by(|a, b| a.id.cmp(&b.id));
                chosen
            }
            _ => self.personas.clone(),
        }
    }

    async fn reflect(
        &mut self,
        generation: Generation,
        evaluated: Vec<Prompt>,
        summary: &mut GenerationSummary,
    ) {
        let panels: Vec<(Prompt, Vec<EvaluationResult>)> = evaluated
            .into_iter()
            .map(|prompt| {
                let results = self
                    .ledger
                    .results(prompt.id())
                    .iter()
                    .filter(|r| r.generation == generation)
                    .cloned()
                    .collect();
                (prompt, results)
            })
            .collect();

        let reviews = join_all(
            panels
                .iter()
                .map(|(prompt, results)| self.reflection.review(prompt, results)),
        )
        .await;

        for review in reviews {
            summary.degraded_notes += review.degraded();
            for note in review.reflections {
                self.notes.push_reflection(note);
            }
            self.notes.push_synthesis(review.synthesis);
        }
    }

    /// Breed the configured number of children into `next`.
    ///
    /// Children are bred one after another so lineage names and sampling
    /// are reproducible under a fixed seed.
    async fn breed(
        &mut self,
        next: Generation,
        pool: &BreedingPool,
        tested: &[PromptId],
    ) -> BreedingStatistics {
        let mut stats = BreedingStatistics::default();
        self.carry_elites(next, pool, &mut stats);
        let sampler = ParentSampler::new(pool, tested, self.config.breeding.exploration_rate);

        let crossovers = self.config.crossover_children();
        let mutations = self.config.children_per_generation - crossovers;
        let plan = std::iter::repeat(OperatorKind::Mutation)
            .take(mutations)
            .chain(std::iter::repeat(OperatorKind::Crossover).take(crossovers));

        for operator in plan {
            let offspring = match operator {
                OperatorKind::Crossover => match sampler.sample_pair(&mut self.rng) {
                    Some((first, second)) => self.crossover(first, second, next).await,
                    None => {
                        debug!("Only one candidate parent, mutating instead of crossover");
                        stats.crossover_fallbacks += 1;
                        self.mutate(&sampler, next).await
                    }
                },
                _ => self.mutate(&sampler, next).await,
            };

            let Some(offspring) = offspring else {
                stats.dropped += 1;
                continue;
            };
            let operator = offspring.prompt.operator();
            let lineage = offspring.prompt.lineage().to_string();
            match self.population.insert(offspring.prompt) {
                Ok(_) => match operator {
                    OperatorKind::Mutation => stats.mutations += 1,
                    OperatorKind::Crossover => stats.crossovers += 1,
                    OperatorKind::Clone => stats.clones += 1,
                    OperatorKind::Elite | OperatorKind::Seed => {}
                },
                Err(e) => {
                    warn!("Dropping child {}: {}", lineage, e);
                    stats.dropped += 1;
                }
            }
        }

        info!(
            "Bred {} child(ren) for generation {}: {} elite(s), {} mutation(s), {} crossover(s), {} clone(s)",
            stats.children(),
            next,
            stats.elites,
            stats.mutations,
            stats.crossovers,
            stats.clones
        );
        stats
    }

    /// Re-mint up to `breeding.elites` frontier members into `next` so they
    /// are tested again. Texts already carried this generation are skipped.
    fn carry_elites(
        &mut self,
        next: Generation,
        pool: &BreedingPool,
        stats: &mut BreedingStatistics,
    ) {
        let limit = self.config.breeding.elites;
        let mut carried: Vec<String> = Vec::new();

        for member in pool.members().iter().filter(|m| m.on_frontier) {
            if carried.len() >= limit {
                break;
            }
            let Some(parent) = self.population.get(member.prompt_id) else {
                continue;
            };
            if carried.iter().any(|text| text == parent.text()) {
                debug!("{} repeats an elite already carried", parent.lineage());
                continue;
            }

            let lineage = self.namer.child(next, OperatorKind::Elite, &[parent.lineage()]);
            let elite = Prompt::new(
                Origin::Elite { parent: parent.id() },
                next,
                lineage,
                parent.text(),
            );
            carried.push(parent.text().to_string());
            debug!("Elite: {} -> {}", parent.lineage(), elite.lineage());

            match self.population.insert(elite) {
                Ok(_) => stats.elites += 1,
                Err(e) => {
                    warn!("Dropping elite: {}", e);
                    stats.dropped += 1;
                }
            }
        }
    }

    async fn mutate(&mut self, sampler: &ParentSampler<'_>, next: Generation) -> Option<Offspring> {
        let parent = sampler.sample(&mut self.rng)?;
        let parent = self.parent_context(parent)?;
        Some(self.operators.mutate(&parent, next, &mut self.namer).await)
    }

    async fn crossover(
        &mut self,
        first: PromptId,
        second: PromptId,
        next: Generation,
    ) -> Option<Offspring> {
        let first = self.parent_context(first)?;
        let second = self.parent_context(second)?;
        Some(
            self.operators
                .crossover(&first, &second, next, &mut self.namer)
                .await,
        )
    }

    fn parent_context(&self, id: PromptId) -> Option<ParentContext> {
        let prompt = self.population.get(id)?.clone();
        let mut context = ParentContext::new(prompt).with_criteria(self.ledger.criteria(id));
        if let Some(record) = self.ledger.latest(id) {
            context = context.with_record(record.clone());
        }
        if let Some(synthesis) = self.notes.latest_synthesis(id) {
            context = context.with_synthesis(synthesis.clone());
        }
        Some(context)
    }

    fn wall_clock_exhausted(&self, run_started: Instant) -> bool {
        self.config
            .wall_clock_budget
            .is_some_and(|budget| run_started.elapsed() >= budget)
    }

    fn transition(&mut self, state: GenerationState) {
        info!("{} -> {}", self.state, state);
        self.state = state;
    }

    /// Record the summary, notify the sink and settle the next state.
    async fn finish(
        &mut self,
        mut summary: GenerationSummary,
        step_started: Instant,
        halt: Option<HaltReason>,
    ) -> GenerationSummary {
        summary.population_size = self.population.len();
        summary.duration_ms = step_started.elapsed().as_millis() as u64;

        match halt {
            Some(reason) => {
                self.transition(GenerationState::Terminal(reason));
                info!("Optimization stopped: {}", reason);
            }
            None => self.transition(GenerationState::Evaluating(self.generation)),
        }

        info!(
            "Generation {}: {} evaluated, {} censored, best {}",
            summary.generation,
            summary.evaluated,
            summary.censored,
            summary
                .best_fitness
                .map(|f| format!("{:+.3}", f))
                .unwrap_or_else(|| "n/a".to_string())
        );

        self.summaries.push(summary.clone());
        if let Err(e) = self.sink.generation_complete(&summary).await {
            warn!("Report sink rejected generation {}: {:#}", summary.generation, e);
        }
        if self.is_terminal() {
            let report = self.report();
            if let Err(e) = self.sink.run_complete(&report).await {
                warn!("Report sink rejected final report: {:#}", e);
            }
        }
        summary
    }
}
