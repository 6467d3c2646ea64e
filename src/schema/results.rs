//! Progress, history and final result types of a search run.
//!
//! Fitness values are `Option<f64>`: `None` marks an individual whose
//! evaluation failed (scored as the worst possible fitness internally).

use serde::{Deserialize, Serialize};

use crate::scenario::{ScenarioKind, ScenarioSpec, TargetClass};

/// Progress update sent to the callback after every generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Current generation number.
    pub generation: usize,
    /// Total generations planned.
    pub total_generations: usize,
    /// Number of evaluations completed this generation.
    pub evaluations_completed: usize,
    /// Total evaluations this generation.
    pub evaluations_total: usize,
    /// Best fitness seen so far.
    pub best_fitness: Option<f64>,
    /// Average finite fitness of the current population.
    pub avg_fitness: Option<f64>,
    /// Best fitness this generation.
    pub generation_best: Option<f64>,
    /// Generations since last improvement.
    pub stagnation_count: usize,
    pub best_candidate: Option<ScenarioSnapshot>,
    pub top_candidates: Vec<ScenarioSnapshot>,
    pub history: EvolutionHistory,
    pub phase: EvolutionPhase,
}

/// Snapshot of an individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    /// Unique identifier within the run.
    pub id: u64,
    /// Fitness score, `None` if the evaluation failed.
    pub fitness: Option<f64>,
    /// Generation this individual was created in.
    pub generation: usize,
    /// Parent IDs (for genealogy).
    pub parents: Vec<u64>,
    /// Runner-facing form of the genome.
    pub scenario: ScenarioSpec,
}

/// Per-generation statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionHistory {
    /// Best fitness per generation.
    pub best_fitness: Vec<Option<f64>>,
    /// Average finite fitness per generation.
    pub avg_fitness: Vec<Option<f64>>,
    /// Standard deviation of finite fitness per generation.
    pub fitness_std: Vec<Option<f64>>,
    /// Distinct genomes divided by population size.
    pub diversity: Vec<f64>,
    /// Failed evaluations per generation.
    pub failed: Vec<usize>,
}

impl EvolutionHistory {
    pub fn len(&self) -> usize {
        self.best_fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best_fitness.is_empty()
    }
}

/// Current phase of the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    /// Seeding the population.
    #[default]
    Initializing,
    Evaluating,
    Selecting,
    /// Crossover, mutation and injection.
    Breeding,
    /// Stopped by a stopping criterion.
    Complete,
    /// Cancelled or timed out.
    Stopped,
}

/// A variant dropped from the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedScenario {
    pub kind: ScenarioKind,
    pub class: TargetClass,
    /// Generation in which the exclusion happened; 0 for seeding.
    pub generation: usize,
}

/// Final result of a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Best individual found, if any generation completed.
    pub best: Option<ScenarioSnapshot>,
    /// Best distinct individuals, best first.
    pub archive: Vec<ScenarioSnapshot>,
    pub stats: EvolutionStats,
    pub history: EvolutionHistory,
    pub excluded: Vec<ExcludedScenario>,
}

/// Statistics from a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Completed generations.
    pub generations: usize,
    /// Evaluator calls made.
    pub total_evaluations: u64,
    /// Evaluations answered from the fitness cache.
    pub cache_hits: u64,
    /// Evaluator calls that failed.
    pub failed_evaluations: u64,
    pub best_fitness: Option<f64>,
    /// Average finite fitness of the final population.
    pub final_avg_fitness: Option<f64>,
    pub elapsed_seconds: f64,
    pub evaluations_per_second: f64,
    pub stop_reason: StopReason,
}

/// Reason the search stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Best fitness reached the configured threshold.
    TargetReached,
    /// Best fitness stopped improving.
    Saturation,
    /// Cancelled through the cancel handle.
    Cancelled,
    /// Run timeout elapsed.
    TimedOut,
}
