//! Generation loop of the scenario search.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::rng::ScenarioRng;
use crate::scenario::{Scenario, ScenarioKind, TargetUnavailable};
use crate::schema::{
    ClusterDiscovery, ClusterInventory, ConfigError, DiscoveryError, EvolutionConfig,
    EvolutionHistory, EvolutionPhase, EvolutionProgress, EvolutionResult, EvolutionStats,
    ExcludedScenario, ScenarioSnapshot, SelectionMethod, StopReason,
};
use crate::select::PatternError;

use super::archive::ScenarioArchive;
use super::fitness::{EvaluationError, EvaluationPool, FitnessEvaluator, Interrupt};

const TOP_CANDIDATES: usize = 5;

/// Run-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("Cluster inventory unavailable: {0}")]
    CollaboratorUnavailable(#[from] DiscoveryError),
    #[error("No scenario can be seeded: {}", describe_missing(.0))]
    NothingToSeed(Vec<ExcludedScenario>),
    #[error("{failures} consecutive fitness evaluations failed, last: {last}")]
    FailureBudgetExceeded {
        failures: usize,
        last: EvaluationError,
    },
    #[error("Failed to build evaluation pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

fn describe_missing(excluded: &[ExcludedScenario]) -> String {
    if excluded.is_empty() {
        return "no scenario kind enabled".to_string();
    }
    let classes: BTreeSet<String> = excluded.iter().map(|e| e.class.to_string()).collect();
    let kinds: Vec<&str> = excluded.iter().map(|e| e.kind.as_str()).collect();
    format!(
        "missing {} (needed by {})",
        classes.into_iter().collect::<Vec<_>>().join(", "),
        kinds.join(", ")
    )
}

/// A genome in the population.
#[derive(Debug, Clone)]
pub struct Individual {
    /// Unique identifier within the run.
    pub id: u64,
    pub scenario: Scenario,
    /// Unset until evaluated; a failed evaluation scores `NEG_INFINITY`.
    pub fitness: Option<f64>,
    /// Generation this individual was created in.
    pub generation: usize,
    pub parents: Vec<u64>,
}

impl Individual {
    /// Fitness used for ranking; unevaluated counts as worst.
    fn score(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn to_snapshot(&self) -> ScenarioSnapshot {
        ScenarioSnapshot {
            id: self.id,
            fitness: self.fitness.filter(|f| f.is_finite()),
            generation: self.generation,
            parents: self.parents.clone(),
            scenario: self.scenario.to_spec(),
        }
    }
}

/// Evolutionary search over chaos scenarios.
pub struct SearchEngine {
    config: EvolutionConfig,
    inventory: ClusterInventory,
    rng: ScenarioRng,
    evaluator: Arc<dyn FitnessEvaluator>,
    pool: EvaluationPool,
    population: Vec<Individual>,
    archive: ScenarioArchive,
    history: EvolutionHistory,
    /// Kinds still eligible for seeding and injection.
    enabled: Vec<ScenarioKind>,
    excluded: Vec<ExcludedScenario>,
    cache: HashMap<String, f64>,
    generation: usize,
    best_fitness: Option<f64>,
    stagnation_count: usize,
    next_id: u64,
    phase: EvolutionPhase,
    evaluations: u64,
    cache_hits: u64,
    failed_evaluations: u64,
    consecutive_failures: usize,
    cancelled: Arc<AtomicBool>,
}

impl SearchEngine {
    /// Create an engine over `inventory`. Target filters from the
    /// configuration are applied to the inventory here.
    pub fn new<E>(
        config: EvolutionConfig,
        mut inventory: ClusterInventory,
        evaluator: E,
    ) -> Result<Self, SearchError>
    where
        E: FitnessEvaluator + 'static,
    {
        config.validate()?;
        let filters = config.targets.compile()?;
        inventory.apply_filters(&filters);

        let pool = EvaluationPool::new(
            config.evaluation.workers,
            Duration::from_secs(config.evaluation.grace_period_secs),
        )?;
        let rng = ScenarioRng::from_seed(config.random_seed);
        log::info!(
            "search seed {:?}, population {}, {} evaluation workers",
            rng.get_seed(),
            config.population.size,
            pool.workers()
        );

        Ok(Self {
            enabled: config.enabled_scenarios(),
            archive: ScenarioArchive::new(config.archive.max_size),
            config,
            inventory,
            rng,
            evaluator: Arc::new(evaluator),
            pool,
            population: Vec::new(),
            history: EvolutionHistory::default(),
            excluded: Vec::new(),
            cache: HashMap::new(),
            generation: 0,
            best_fitness: None,
            stagnation_count: 0,
            next_id: 0,
            phase: EvolutionPhase::Initializing,
            evaluations: 0,
            cache_hits: 0,
            failed_evaluations: 0,
            consecutive_failures: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create an engine from a discovery collaborator.
    pub fn discover<D, E>(
        config: EvolutionConfig,
        discovery: &D,
        evaluator: E,
    ) -> Result<Self, SearchError>
    where
        D: ClusterDiscovery + ?Sized,
        E: FitnessEvaluator + 'static,
    {
        let inventory = discovery.discover()?;
        Self::new(config, inventory, evaluator)
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn inventory(&self) -> &ClusterInventory {
        &self.inventory
    }

    pub fn excluded(&self) -> &[ExcludedScenario] {
        &self.excluded
    }

    fn exclude(&mut self, err: TargetUnavailable) {
        self.enabled.retain(|k| *k != err.kind);
        if self.excluded.iter().any(|e| e.kind == err.kind) {
            return;
        }
        log::warn!("excluding {} for the rest of the run: {err}", err.kind);
        self.excluded.push(ExcludedScenario {
            kind: err.kind,
            class: err.class,
            generation: self.generation,
        });
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Fresh genome of a random enabled kind. Kinds that fail to construct
    /// are excluded and another kind is tried.
    fn random_scenario(&mut self) -> Option<Scenario> {
        while !self.enabled.is_empty() {
            let kind = self.enabled[self.rng.index(self.enabled.len())];
            match Scenario::random(kind, &self.inventory, &mut self.rng) {
                Ok(scenario) => return Some(scenario),
                Err(err) => self.exclude(err),
            }
        }
        None
    }

    /// Build the seed population.
    pub fn initialize(&mut self) -> Result<(), SearchError> {
        self.population.clear();
        self.generation = 0;
        self.phase = EvolutionPhase::Initializing;

        for kind in self.enabled.clone() {
            if let Err(err) = Scenario::check(kind, &self.inventory) {
                self.exclude(err);
            }
        }

        for _ in 0..self.config.population.size {
            let Some(scenario) = self.random_scenario() else {
                return Err(SearchError::NothingToSeed(self.excluded.clone()));
            };
            let id = self.next_id();
            self.population.push(Individual {
                id,
                scenario,
                fitness: None,
                generation: 0,
                parents: Vec::new(),
            });
        }
        log::debug!(
            "seeded {} individuals from {} kinds",
            self.population.len(),
            self.enabled.len()
        );
        Ok(())
    }

    /// Score every individual lacking a fitness.
    ///
    /// Returns the interruption, if any; the generation's results are then
    /// incomplete and must not be used.
    fn evaluate_population(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<Option<Interrupt>, SearchError> {
        self.phase = EvolutionPhase::Evaluating;
        let use_cache = self.config.evaluation.cache_fitness;

        // One job per distinct pending genome.
        let mut jobs: Vec<(String, Vec<usize>)> = Vec::new();
        let mut job_of: HashMap<String, usize> = HashMap::new();
        for (slot, individual) in self.population.iter_mut().enumerate() {
            if individual.fitness.is_some() {
                continue;
            }
            let identity = individual.scenario.identity();
            if use_cache && let Some(&score) = self.cache.get(&identity) {
                individual.fitness = Some(score);
                self.cache_hits += 1;
                continue;
            }
            let existing = if use_cache {
                job_of.get(&identity).copied()
            } else {
                None
            };
            match existing {
                Some(job) => jobs[job].1.push(slot),
                None => {
                    job_of.insert(identity.clone(), jobs.len());
                    jobs.push((identity, vec![slot]));
                }
            }
        }
        if jobs.is_empty() {
            return Ok(None);
        }

        let scenarios = jobs
            .iter()
            .map(|(_, slots)| self.population[slots[0]].scenario.clone())
            .collect();
        let outcome =
            self.pool
                .evaluate_all(&self.evaluator, scenarios, &self.cancelled, deadline);
        if outcome.interrupted.is_some() {
            return Ok(outcome.interrupted);
        }

        for ((identity, slots), result) in jobs.into_iter().zip(outcome.results) {
            self.evaluations += 1;
            let result = match result {
                Some(Ok(score)) if score.is_finite() => Ok(score),
                Some(Ok(score)) => Err(EvaluationError::NonFinite(score)),
                Some(Err(err)) => Err(err),
                None => Err(EvaluationError::Execution("evaluation did not complete".into())),
            };
            let score = match result {
                Ok(score) => {
                    self.consecutive_failures = 0;
                    if use_cache {
                        self.cache.insert(identity, score);
                    }
                    score
                }
                Err(err) => {
                    self.failed_evaluations += 1;
                    self.consecutive_failures += 1;
                    log::warn!(
                        "evaluation of {} failed ({} in a row): {err}",
                        self.population[slots[0]].scenario.kind(),
                        self.consecutive_failures
                    );
                    if let Some(budget) = self.config.evaluation.max_consecutive_failures
                        && self.consecutive_failures > budget
                    {
                        return Err(SearchError::FailureBudgetExceeded {
                            failures: self.consecutive_failures,
                            last: err,
                        });
                    }
                    f64::NEG_INFINITY
                }
            };
            for slot in slots {
                self.population[slot].fitness = Some(score);
            }
        }
        Ok(None)
    }

    /// Fold a fully evaluated generation into history, archive and the
    /// stopping counters.
    fn record_generation(&mut self) {
        let finite: Vec<f64> = self
            .population
            .iter()
            .map(Individual::score)
            .filter(|f| f.is_finite())
            .collect();
        let failed = self.population.len() - finite.len();
        let gen_best = finite.iter().copied().reduce(f64::max);
        let (avg, std) = mean_std(&finite);

        let tolerance = self.config.population.saturation_tolerance;
        match (gen_best, self.best_fitness) {
            (Some(best), None) => {
                self.best_fitness = Some(best);
                self.stagnation_count = 0;
            }
            (Some(best), Some(prev)) if best > prev + tolerance => {
                self.best_fitness = Some(best);
                self.stagnation_count = 0;
            }
            (Some(best), Some(prev)) => {
                self.best_fitness = Some(prev.max(best));
                self.stagnation_count += 1;
            }
            (None, _) => self.stagnation_count += 1,
        }

        let distinct: BTreeSet<String> = self
            .population
            .iter()
            .map(|i| i.scenario.identity())
            .collect();
        self.history.best_fitness.push(gen_best);
        self.history.avg_fitness.push(avg);
        self.history.fitness_std.push(std);
        self.history
            .diversity
            .push(distinct.len() as f64 / self.population.len().max(1) as f64);
        self.history.failed.push(failed);

        for individual in &self.population {
            self.archive.offer(individual.to_snapshot());
        }

        self.generation += 1;
        log::info!(
            "generation {}/{}: best {:?}, avg {:?}, {} failed, {} distinct",
            self.generation,
            self.config.population.max_generations,
            gen_best,
            avg,
            failed,
            distinct.len()
        );
    }

    /// Check the stopping criteria after a generation's fitness pass.
    fn should_stop(&self) -> Option<StopReason> {
        let population = &self.config.population;
        if let Some(threshold) = population.fitness_threshold
            && self
                .history
                .best_fitness
                .last()
                .copied()
                .flatten()
                .is_some_and(|best| best >= threshold)
        {
            return Some(StopReason::TargetReached);
        }
        if let Some(limit) = population.generation_saturation
            && self.stagnation_count >= limit
        {
            return Some(StopReason::Saturation);
        }
        if self.generation >= population.max_generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    /// Select a parent index using the configured method.
    fn select_index(&mut self, ranked: &[usize]) -> usize {
        let n = ranked.len();
        match self.config.algorithm.selection {
            SelectionMethod::Tournament { size } => {
                let mut best = ranked[self.rng.index(n)];
                for _ in 1..size {
                    let candidate = ranked[self.rng.index(n)];
                    if self.population[candidate].score() > self.population[best].score() {
                        best = candidate;
                    }
                }
                best
            }
            SelectionMethod::RankBased => {
                let weights: Vec<f64> = (0..n).map(|rank| (n - rank) as f64).collect();
                self.rng
                    .choices(ranked, &weights, 1)
                    .first()
                    .map_or(ranked[0], |&&i| i)
            }
            SelectionMethod::RouletteWheel => {
                let weights: Vec<f64> = ranked
                    .iter()
                    .map(|&i| {
                        let f = self.population[i].score();
                        if f.is_finite() { f.max(0.0) } else { 0.0 }
                    })
                    .collect();
                // All-zero weights fall back to uniform draws.
                self.rng
                    .choices(ranked, &weights, 1)
                    .first()
                    .map_or(ranked[0], |&&i| i)
            }
        }
    }

    /// Number of fresh genomes injected this generation.
    fn injection_count(&self, room: usize) -> usize {
        let algorithm = &self.config.algorithm;
        if algorithm.injection_rate <= 0.0 {
            return 0;
        }
        let by_rate = (algorithm.injection_rate * self.config.population.size as f64).round();
        (by_rate as usize).max(algorithm.injection_min).min(room)
    }

    /// Breed the next generation from the evaluated one.
    fn breed(&mut self) {
        self.phase = EvolutionPhase::Selecting;
        let size = self.config.population.size;
        let mut ranked: Vec<usize> = (0..self.population.len()).collect();
        ranked.sort_by(|&a, &b| {
            self.population[b]
                .score()
                .total_cmp(&self.population[a].score())
        });

        let elitism = self.config.algorithm.elitism.min(ranked.len());
        let mut next_gen: Vec<Individual> = ranked[..elitism]
            .iter()
            .map(|&i| self.population[i].clone())
            .collect();

        self.phase = EvolutionPhase::Breeding;
        let injected = self.injection_count(size - next_gen.len());
        let offspring = size - next_gen.len() - injected;
        for _ in 0..offspring {
            let child = self.make_offspring(&ranked);
            next_gen.push(child);
        }
        for _ in 0..injected {
            // An empty pool of kinds leaves room for one more offspring.
            let child = match self.random_scenario() {
                Some(scenario) => Individual {
                    id: self.next_id(),
                    scenario,
                    fitness: None,
                    generation: self.generation,
                    parents: Vec::new(),
                },
                None => self.make_offspring(&ranked),
            };
            next_gen.push(child);
        }
        log::debug!(
            "bred generation {}: {elitism} elites, {offspring} offspring, {injected} injected",
            self.generation
        );
        self.population = next_gen;
    }

    fn make_offspring(&mut self, ranked: &[usize]) -> Individual {
        let algorithm = self.config.algorithm.clone();
        let first = self.select_index(ranked);
        let second = self.select_index(ranked);
        let (a, b) = (&self.population[first], &self.population[second]);

        let mut parents = vec![a.id];
        let mut scenario = if a.scenario.kind() == b.scenario.kind()
            && self.rng.chance(algorithm.crossover_rate)
        {
            parents.push(b.id);
            a.scenario.crossover(&b.scenario, &mut self.rng)
        } else {
            a.scenario.clone()
        };

        // `mutation_rate` gates the offspring and then each of its
        // inventory-independent genes, so a knob changes with probability
        // `mutation_rate²`. Targeting is always re-derived once mutated.
        if self.rng.chance(algorithm.mutation_rate) {
            if self.rng.chance(algorithm.scenario_mutation_rate) {
                if let Some(fresh) = self.random_scenario() {
                    scenario = fresh;
                }
            } else if let Err(err) =
                scenario.mutate_with_rate(&self.inventory, &mut self.rng, algorithm.mutation_rate)
            {
                self.exclude(err);
                if let Some(fresh) = self.random_scenario() {
                    scenario = fresh;
                }
            }
        }

        Individual {
            id: self.next_id(),
            scenario,
            fitness: None,
            generation: self.generation,
            parents,
        }
    }

    fn ranked_snapshots(&self, n: usize) -> Vec<ScenarioSnapshot> {
        let mut sorted: Vec<&Individual> = self.population.iter().collect();
        sorted.sort_by(|a, b| b.score().total_cmp(&a.score()));
        sorted
            .into_iter()
            .take(n)
            .map(Individual::to_snapshot)
            .collect()
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        let evaluated = self
            .population
            .iter()
            .filter(|i| i.fitness.is_some())
            .count();
        EvolutionProgress {
            generation: self.generation,
            total_generations: self.config.population.max_generations,
            evaluations_completed: evaluated,
            evaluations_total: self.population.len(),
            best_fitness: self.best_fitness,
            avg_fitness: self.history.avg_fitness.last().copied().flatten(),
            generation_best: self.history.best_fitness.last().copied().flatten(),
            stagnation_count: self.stagnation_count,
            best_candidate: self.archive.best().cloned(),
            top_candidates: self.ranked_snapshots(TOP_CANDIDATES),
            history: self.history.clone(),
            phase: self.phase,
        }
    }

    /// Run the search with a progress callback invoked after every completed
    /// generation.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<EvolutionResult, SearchError>
    where
        F: FnMut(&EvolutionProgress),
    {
        let start_time = Instant::now();
        let deadline = self
            .config
            .evaluation
            .run_timeout_secs
            .map(|secs| start_time + Duration::from_secs(secs));

        self.initialize()?;

        let stop_reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break StopReason::TimedOut;
            }

            match self.evaluate_population(deadline)? {
                Some(Interrupt::Cancelled) => break StopReason::Cancelled,
                Some(Interrupt::TimedOut) => break StopReason::TimedOut,
                None => {}
            }
            self.record_generation();
            callback(&self.progress());

            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.breed();
        };

        self.phase = match stop_reason {
            StopReason::Cancelled | StopReason::TimedOut => EvolutionPhase::Stopped,
            _ => EvolutionPhase::Complete,
        };
        log::info!(
            "search stopped after {} generations: {stop_reason:?}",
            self.generation
        );
        callback(&self.progress());

        let elapsed = start_time.elapsed().as_secs_f64();
        let final_avg_fitness = self.history.avg_fitness.last().copied().flatten();
        Ok(EvolutionResult {
            best: self.archive.best().cloned(),
            archive: self.archive.entries().to_vec(),
            stats: EvolutionStats {
                generations: self.generation,
                total_evaluations: self.evaluations,
                cache_hits: self.cache_hits,
                failed_evaluations: self.failed_evaluations,
                best_fitness: self.best_fitness,
                final_avg_fitness,
                elapsed_seconds: elapsed,
                evaluations_per_second: if elapsed > 0.0 {
                    self.evaluations as f64 / elapsed
                } else {
                    0.0
                },
                stop_reason,
            },
            history: self.history.clone(),
            excluded: self.excluded.clone(),
        })
    }

    /// Run the search (blocking).
    pub fn run(&mut self) -> Result<EvolutionResult, SearchError> {
        self.run_with_callback(|_| {})
    }
}

fn mean_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::evolution::MockEvaluator;
    use crate::scenario::TargetClass;
    use crate::scenario::testing::{bare_nodes, full_inventory};
    use crate::schema::{EvaluationConfig, PopulationConfig};

    fn config(size: usize, generations: usize) -> EvolutionConfig {
        EvolutionConfig {
            population: PopulationConfig {
                size,
                max_generations: generations,
                ..Default::default()
            },
            evaluation: EvaluationConfig {
                workers: 2,
                ..Default::default()
            },
            random_seed: Some(42),
            ..Default::default()
        }
    }

    /// Records every requested identity.
    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FitnessEvaluator for Recorder {
        fn evaluate(&self, scenario: &Scenario) -> Result<f64, EvaluationError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(scenario.identity());
            }
            Ok(MockEvaluator::score(scenario))
        }
    }

    #[test]
    fn test_engine_creation() {
        let mut engine =
            SearchEngine::new(config(10, 5), full_inventory(), MockEvaluator::new()).unwrap();
        engine.initialize().unwrap();
        assert_eq!(engine.population().len(), 10);
        assert!(engine.population().iter().all(|i| i.scenario.is_valid()));
    }

    #[test]
    fn test_runs_exactly_max_generations() {
        let mut engine =
            SearchEngine::new(config(6, 4), full_inventory(), MockEvaluator::new()).unwrap();
        let mut calls = 0;
        let result = engine.run_with_callback(|_| calls += 1).unwrap();
        assert_eq!(result.stats.generations, 4);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.history.len(), 4);
        // One per generation plus the final report.
        assert_eq!(calls, 5);
        assert!(result.best.is_some());
    }

    #[test]
    fn test_deterministic_runs() {
        let run = || {
            let recorder = Recorder::default();
            let seen = Arc::clone(&recorder.seen);
            let mut engine = SearchEngine::new(config(8, 5), full_inventory(), recorder).unwrap();
            let result = engine.run().unwrap();
            let mut requests = seen.lock().unwrap().clone();
            requests.sort();
            let population: Vec<String> = engine
                .population()
                .iter()
                .map(|i| i.scenario.identity())
                .collect();
            (result.history, requests, population)
        };
        let (history_a, requests_a, population_a) = run();
        let (history_b, requests_b, population_b) = run();
        assert_eq!(history_a, history_b);
        assert_eq!(requests_a, requests_b);
        assert_eq!(population_a, population_b);
    }

    #[test]
    fn test_threshold_stops_at_first_hit() {
        let mut cfg = config(6, 50);
        cfg.population.fitness_threshold = Some(0.5);
        let mut engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        let result = engine.run().unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::TargetReached);
        let bests: Vec<f64> = result
            .history
            .best_fitness
            .iter()
            .map(|b| b.unwrap())
            .collect();
        let last = bests.len() - 1;
        assert!(bests[last] >= 0.5);
        assert!(bests[..last].iter().all(|&b| b < 0.5));
    }

    #[test]
    fn test_saturation_stops() {
        let mut cfg = config(4, 100);
        cfg.population.generation_saturation = Some(3);
        // Constant fitness never improves after the first generation.
        let evaluator = |_: &Scenario| -> Result<f64, EvaluationError> { Ok(1.0) };
        let mut engine = SearchEngine::new(cfg, full_inventory(), evaluator).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Saturation);
        assert_eq!(result.stats.generations, 4);
    }

    #[test]
    fn test_excludes_unavailable_kinds() {
        let engine_result =
            SearchEngine::new(config(6, 2), bare_nodes(), MockEvaluator::new()).unwrap().run();
        let result = engine_result.unwrap();
        let excluded: Vec<ScenarioKind> = result.excluded.iter().map(|e| e.kind).collect();
        assert!(excluded.contains(&ScenarioKind::ServiceHijacking));
        assert!(excluded.contains(&ScenarioKind::PvcFill));
        assert!(!excluded.contains(&ScenarioKind::NodeCpuHog));
        for snapshot in &result.archive {
            assert!(!excluded.contains(&snapshot.scenario.kind));
        }
    }

    #[test]
    fn test_nothing_to_seed_names_missing_class() {
        let mut cfg = config(4, 2);
        cfg.scenarios = vec![ScenarioKind::ServiceHijacking, ScenarioKind::VmOutage];
        let mut engine = SearchEngine::new(cfg, bare_nodes(), MockEvaluator::new()).unwrap();
        let err = engine.run().unwrap_err();
        match &err {
            SearchError::NothingToSeed(excluded) => {
                let classes: Vec<TargetClass> = excluded.iter().map(|e| e.class).collect();
                assert!(classes.contains(&TargetClass::Services));
                assert!(classes.contains(&TargetClass::VirtualMachines));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().contains("services"));
    }

    #[test]
    fn test_failure_budget() {
        let failing = |_: &Scenario| -> Result<f64, EvaluationError> {
            Err(EvaluationError::MetricsUnavailable("prometheus down".into()))
        };
        let mut cfg = config(8, 3);
        cfg.evaluation.max_consecutive_failures = Some(3);
        let mut engine = SearchEngine::new(cfg, full_inventory(), failing).unwrap();
        assert!(matches!(
            engine.run(),
            Err(SearchError::FailureBudgetExceeded { failures: 4, .. })
        ));
    }

    #[test]
    fn test_failures_score_worst_without_budget() {
        let mut cfg = config(6, 3);
        cfg.evaluation.max_consecutive_failures = None;
        cfg.scenarios = vec![ScenarioKind::NodeCpuHog, ScenarioKind::ZoneOutages];
        let evaluator = MockEvaluator {
            failing: vec![ScenarioKind::ZoneOutages],
            delay: None,
        };
        let mut engine = SearchEngine::new(cfg, full_inventory(), evaluator).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.stats.generations, 3);
        assert!(
            result
                .archive
                .iter()
                .all(|s| s.scenario.kind == ScenarioKind::NodeCpuHog)
        );
    }

    #[test]
    fn test_cancellation() {
        let mut engine =
            SearchEngine::new(config(5, 100), full_inventory(), MockEvaluator::new()).unwrap();
        let cancel = engine.cancel_handle();
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 0);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_cancel_from_callback_keeps_completed_generations() {
        let mut engine =
            SearchEngine::new(config(5, 100), full_inventory(), MockEvaluator::new()).unwrap();
        let cancel = engine.cancel_handle();
        let result = engine
            .run_with_callback(|p| {
                if p.generation == 2 {
                    cancel.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 2);
        assert_eq!(result.history.len(), 2);
    }

    #[test]
    fn test_elites_survive_with_fitness() {
        let mut cfg = config(6, 2);
        cfg.algorithm.elitism = 2;
        let mut engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        engine.initialize().unwrap();
        assert!(engine.evaluate_population(None).unwrap().is_none());
        engine.record_generation();
        let mut best: Vec<&Individual> = engine.population.iter().collect();
        best.sort_by(|a, b| b.score().total_cmp(&a.score()));
        let elite_ids: Vec<u64> = best[..2].iter().map(|i| i.id).collect();

        engine.breed();
        assert_eq!(engine.population.len(), 6);
        let carried: Vec<&Individual> = engine.population[..2].iter().collect();
        assert_eq!(carried.iter().map(|i| i.id).collect::<Vec<_>>(), elite_ids);
        assert!(carried.iter().all(|i| i.fitness.is_some()));
        assert!(engine.population[2..].iter().all(|i| i.fitness.is_none()));
    }

    #[test]
    fn test_unmutated_offspring_copy_a_parent() {
        let mut cfg = config(8, 2);
        cfg.algorithm.mutation_rate = 0.0;
        cfg.algorithm.crossover_rate = 0.0;
        let mut engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        engine.initialize().unwrap();
        assert!(engine.evaluate_population(None).unwrap().is_none());
        engine.record_generation();
        let parents: BTreeSet<String> = engine
            .population
            .iter()
            .map(|i| i.scenario.identity())
            .collect();

        engine.breed();
        for child in &engine.population {
            assert!(parents.contains(&child.scenario.identity()));
            assert!(child.parents.len() <= 1);
        }
    }

    #[test]
    fn test_injection_count() {
        let mut cfg = config(10, 2);
        cfg.algorithm.injection_rate = 0.1;
        cfg.algorithm.injection_min = 2;
        let engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        assert_eq!(engine.injection_count(9), 2);
        assert_eq!(engine.injection_count(1), 1);

        let mut cfg = config(10, 2);
        cfg.algorithm.injection_rate = 0.5;
        let engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        assert_eq!(engine.injection_count(9), 5);

        let engine =
            SearchEngine::new(config(10, 2), full_inventory(), MockEvaluator::new()).unwrap();
        assert_eq!(engine.injection_count(9), 0);
    }

    #[test]
    fn test_cache_avoids_reevaluation() {
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let mut cfg = config(6, 6);
        cfg.scenarios = vec![ScenarioKind::ServiceDisruption];
        let mut engine = SearchEngine::new(cfg, full_inventory(), recorder).unwrap();
        let result = engine.run().unwrap();

        let requests = seen.lock().unwrap().clone();
        let distinct: BTreeSet<&String> = requests.iter().collect();
        assert_eq!(distinct.len(), requests.len());
        assert!(result.stats.cache_hits > 0);
    }

    #[test]
    fn test_target_filters_applied() {
        let mut cfg = config(6, 2);
        cfg.targets.namespaces = "batch".into();
        cfg.scenarios = vec![ScenarioKind::ServiceHijacking, ScenarioKind::NodeCpuHog];
        let mut engine = SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].kind, ScenarioKind::ServiceHijacking);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let mut cfg = config(6, 2);
        cfg.targets.nodes = "[invalid".into();
        assert!(matches!(
            SearchEngine::new(cfg, full_inventory(), MockEvaluator::new()),
            Err(SearchError::Config(ConfigError::InvalidTargets(_)))
        ));
    }

    #[test]
    fn test_discovery_failure_is_collaborator_error() {
        let discovery = crate::schema::SnapshotDiscovery::new("/nonexistent/inventory.json");
        assert!(matches!(
            SearchEngine::discover(config(4, 1), &discovery, MockEvaluator::new()),
            Err(SearchError::CollaboratorUnavailable(_))
        ));
    }
}
