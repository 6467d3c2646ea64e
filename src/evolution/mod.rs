//! Evolutionary search for high-impact chaos scenarios.
//!
//! # Overview
//!
//! - **Fitness** (`fitness`): the evaluator seam and the bounded worker pool
//!   that scores a generation concurrently
//! - **Search** (`search`): seeding, selection, crossover, mutation,
//!   injection and stopping criteria
//! - **Archive** (`archive`): best distinct scenarios and their JSON export
//!
//! # Example
//!
//! ```rust,no_run
//! use chaos_search::evolution::{MockEvaluator, SearchEngine};
//! use chaos_search::schema::{EvolutionConfig, SnapshotDiscovery};
//!
//! let config = EvolutionConfig::default();
//! let discovery = SnapshotDiscovery::new("inventory.json");
//! let mut engine = SearchEngine::discover(config, &discovery, MockEvaluator::new())?;
//! let result = engine.run_with_callback(|progress| {
//!     println!("Generation {}: best fitness = {:?}",
//!         progress.generation, progress.best_fitness);
//! })?;
//!
//! if let Some(best) = &result.best {
//!     println!("Best scenario: {}", best.scenario.kind);
//! }
//! # Ok::<(), chaos_search::evolution::SearchError>(())
//! ```

mod archive;
mod fitness;
mod search;

pub use archive::{ScenarioArchive, ScenarioExport, export_snapshots};
pub use fitness::{
    BatchOutcome, EvaluationError, EvaluationPool, FitnessEvaluator, Interrupt, MockEvaluator,
};
pub use search::{Individual, SearchEngine, SearchError};
