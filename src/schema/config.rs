//! Search configuration types.
//!
//! Every section has serde defaults, so a partial JSON document (even `{}`)
//! yields a runnable configuration. Call [`EvolutionConfig::validate`] before
//! starting a run.

use serde::{Deserialize, Serialize};

use super::TargetFilters;
use crate::scenario::ScenarioKind;

/// Top-level configuration for the scenario search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Population and stopping settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Breeding operators.
    #[serde(default)]
    pub algorithm: GeneticAlgorithmConfig,
    /// Fitness evaluation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Variant kinds the search may produce.
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioKind>,
    /// Pattern expressions scoping targetable inventory.
    #[serde(default)]
    pub targets: TargetFilters,
    /// Best-of-run archive.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            algorithm: GeneticAlgorithmConfig::default(),
            evaluation: EvaluationConfig::default(),
            scenarios: default_scenarios(),
            targets: TargetFilters::default(),
            archive: ArchiveConfig::default(),
            random_seed: None,
        }
    }
}

fn default_scenarios() -> Vec<ScenarioKind> {
    ScenarioKind::ALL.to_vec()
}

/// Population size and stopping criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    #[serde(default = "default_population_size")]
    pub size: usize,
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stop once the best fitness reaches this value.
    #[serde(default)]
    pub fitness_threshold: Option<f64>,
    /// Stop after this many consecutive generations without improvement.
    #[serde(default)]
    pub generation_saturation: Option<usize>,
    /// Improvements smaller than this count as unchanged.
    #[serde(default = "default_saturation_tolerance")]
    pub saturation_tolerance: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            max_generations: default_max_generations(),
            fitness_threshold: None,
            generation_saturation: None,
            saturation_tolerance: default_saturation_tolerance(),
        }
    }
}

fn default_population_size() -> usize {
    10
}
fn default_max_generations() -> usize {
    20
}
fn default_saturation_tolerance() -> f64 {
    1e-6
}

/// Genetic algorithm operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticAlgorithmConfig {
    #[serde(default)]
    pub selection: SelectionMethod,
    /// Probability that two selected parents are crossed (0.0-1.0).
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Probability of mutating an offspring, and of re-deriving each of its
    /// genes when it is mutated.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Probability that a mutation replaces the offspring with a fresh genome
    /// of a randomly chosen kind.
    #[serde(default = "default_scenario_mutation_rate")]
    pub scenario_mutation_rate: f64,
    /// Number of best individuals carried over unchanged.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Fraction of the population replaced by random genomes each generation.
    #[serde(default)]
    pub injection_rate: f64,
    /// Lower bound on injected genomes while injection is enabled.
    #[serde(default = "default_injection_min")]
    pub injection_min: usize,
}

impl Default for GeneticAlgorithmConfig {
    fn default() -> Self {
        Self {
            selection: SelectionMethod::default(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            scenario_mutation_rate: default_scenario_mutation_rate(),
            elitism: default_elitism(),
            injection_rate: 0.0,
            injection_min: default_injection_min(),
        }
    }
}

fn default_crossover_rate() -> f64 {
    0.6
}
fn default_mutation_rate() -> f64 {
    0.7
}
fn default_scenario_mutation_rate() -> f64 {
    0.6
}
fn default_elitism() -> usize {
    1
}
fn default_injection_min() -> usize {
    2
}

/// Parent selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SelectionMethod {
    /// Best of `size` uniformly drawn individuals.
    Tournament {
        #[serde(default = "default_tournament_size")]
        size: usize,
    },
    /// Probability proportional to rank.
    RankBased,
    /// Fitness-proportionate selection.
    RouletteWheel,
}

impl Default for SelectionMethod {
    fn default() -> Self {
        Self::Tournament {
            size: default_tournament_size(),
        }
    }
}

fn default_tournament_size() -> usize {
    3
}

/// Fitness evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Concurrent evaluations; 0 uses the rayon default.
    #[serde(default)]
    pub workers: usize,
    /// Consecutive failed evaluations tolerated before the run fails.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: Option<usize>,
    /// Wall-clock limit for the whole run.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Time in-flight evaluations get to finish after cancellation.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Reuse the score of an identical genome already evaluated this run.
    #[serde(default = "default_cache_fitness")]
    pub cache_fitness: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_consecutive_failures: default_max_consecutive_failures(),
            run_timeout_secs: None,
            grace_period_secs: default_grace_period_secs(),
            cache_fitness: default_cache_fitness(),
        }
    }
}

fn default_max_consecutive_failures() -> Option<usize> {
    Some(10)
}
fn default_grace_period_secs() -> u64 {
    30
}
fn default_cache_fitness() -> bool {
    true
}

/// Archive of the best distinct scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_size")]
    pub max_size: usize,
    /// Directory the archive is exported to, if any.
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_size: default_archive_size(),
            output_dir: None,
        }
    }
}

fn default_archive_size() -> usize {
    5
}

impl EvolutionConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let population = &self.population;
        if population.size < 2 {
            return Err(ConfigError::PopulationTooSmall(population.size));
        }
        if population.max_generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if population.generation_saturation == Some(0) {
            return Err(ConfigError::InvalidSaturation);
        }
        if !(population.saturation_tolerance >= 0.0) {
            return Err(ConfigError::InvalidTolerance);
        }
        if let Some(threshold) = population.fitness_threshold
            && !threshold.is_finite()
        {
            return Err(ConfigError::InvalidThreshold);
        }

        let algorithm = &self.algorithm;
        for (name, rate) in [
            ("crossover_rate", algorithm.crossover_rate),
            ("mutation_rate", algorithm.mutation_rate),
            ("scenario_mutation_rate", algorithm.scenario_mutation_rate),
            ("injection_rate", algorithm.injection_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidRate { name, rate });
            }
        }
        if let SelectionMethod::Tournament { size } = algorithm.selection
            && size == 0
        {
            return Err(ConfigError::InvalidTournamentSize);
        }
        if algorithm.elitism >= population.size {
            return Err(ConfigError::ElitismTooLarge {
                elitism: algorithm.elitism,
                size: population.size,
            });
        }

        if self.evaluation.max_consecutive_failures == Some(0) {
            return Err(ConfigError::InvalidFailureBudget);
        }
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }
        if self.archive.max_size == 0 {
            return Err(ConfigError::EmptyArchive);
        }

        let pattern_errors = self.targets.validate();
        if !pattern_errors.is_empty() {
            return Err(ConfigError::InvalidTargets(pattern_errors.join("; ")));
        }
        Ok(())
    }

    /// Enabled kinds, deduplicated, in configured order.
    pub fn enabled_scenarios(&self) -> Vec<ScenarioKind> {
        let mut kinds = Vec::with_capacity(self.scenarios.len());
        for kind in &self.scenarios {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("max_generations must be non-zero")]
    NoGenerations,
    #[error("generation_saturation must be non-zero when set")]
    InvalidSaturation,
    #[error("saturation_tolerance must be non-negative")]
    InvalidTolerance,
    #[error("fitness_threshold must be finite")]
    InvalidThreshold,
    #[error("{name} must be within [0, 1], got {rate}")]
    InvalidRate { name: &'static str, rate: f64 },
    #[error("Tournament size must be non-zero")]
    InvalidTournamentSize,
    #[error("Elitism ({elitism}) must be smaller than the population ({size})")]
    ElitismTooLarge { elitism: usize, size: usize },
    #[error("max_consecutive_failures must be non-zero when set")]
    InvalidFailureBudget,
    #[error("At least one scenario kind must be enabled")]
    NoScenarios,
    #[error("Archive size must be non-zero")]
    EmptyArchive,
    #[error("Invalid target filters: {0}")]
    InvalidTargets(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.population.size, 10);
        assert_eq!(config.population.max_generations, 20);
        assert!(config.population.fitness_threshold.is_none());
        assert!(config.population.generation_saturation.is_none());
        assert_eq!(config.scenarios.len(), ScenarioKind::ALL.len());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: EvolutionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.algorithm.crossover_rate, 0.6);
        assert_eq!(config.algorithm.mutation_rate, 0.7);
        assert_eq!(config.algorithm.scenario_mutation_rate, 0.6);
        assert_eq!(config.algorithm.selection, SelectionMethod::Tournament { size: 3 });
        assert_eq!(config.evaluation.max_consecutive_failures, Some(10));
        assert!(config.evaluation.cache_fitness);
        assert_eq!(config.archive.max_size, 5);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "population": { "size": 4, "fitness_threshold": 0.9 },
            "algorithm": { "selection": { "method": "RouletteWheel" } },
            "scenarios": ["node-cpu-hog", "zone-outages"],
            "targets": { "namespaces": "shop,!kube-system" },
            "random_seed": 7
        }"#;
        let config: EvolutionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.population.size, 4);
        assert_eq!(config.population.max_generations, 20);
        assert_eq!(config.population.fitness_threshold, Some(0.9));
        assert_eq!(config.algorithm.selection, SelectionMethod::RouletteWheel);
        assert_eq!(
            config.scenarios,
            vec![ScenarioKind::NodeCpuHog, ScenarioKind::ZoneOutages]
        );
        assert_eq!(config.random_seed, Some(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EvolutionConfig::default();
        config.algorithm.mutation_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate {
                name: "mutation_rate",
                ..
            })
        ));

        let mut config = EvolutionConfig::default();
        config.algorithm.elitism = config.population.size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ElitismTooLarge { .. })
        ));

        let mut config = EvolutionConfig::default();
        config.scenarios.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoScenarios)));

        let mut config = EvolutionConfig::default();
        config.population.generation_saturation = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSaturation)
        ));
    }

    #[test]
    fn test_bad_pattern_surfaces() {
        let mut config = EvolutionConfig::default();
        config.targets.pods = "[invalid".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid regex"));
    }

    #[test]
    fn test_enabled_scenarios_dedup() {
        let config = EvolutionConfig {
            scenarios: vec![
                ScenarioKind::PvcFill,
                ScenarioKind::NodeIoHog,
                ScenarioKind::PvcFill,
            ],
            ..Default::default()
        };
        assert_eq!(
            config.enabled_scenarios(),
            vec![ScenarioKind::PvcFill, ScenarioKind::NodeIoHog]
        );
    }
}
