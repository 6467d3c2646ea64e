//! Chaos Search - evolutionary discovery of high-impact failure scenarios.
//!
//! This crate evolves a population of chaos experiment descriptors against a
//! Kubernetes cluster inventory, keeping every genome valid for the targets
//! that actually exist, and scores them through an external fitness
//! evaluator.
//!
//! # Architecture
//!
//! - `rng`: the single seeded random source every stochastic decision uses
//! - `schema`: configuration, cluster inventory and result types
//! - `select`: name pattern matching and label-based target selection
//! - `scenario`: the scenario genome and its variants
//! - `evolution`: the generation loop, fitness fan-out and archive
//!
//! # Example
//!
//! ```rust,no_run
//! use chaos_search::{
//!     rng::ScenarioRng,
//!     scenario::{Scenario, ScenarioKind},
//!     schema::{ClusterDiscovery, SnapshotDiscovery},
//! };
//!
//! let inventory = SnapshotDiscovery::new("inventory.json").discover()?;
//! let mut rng = ScenarioRng::new(7);
//!
//! let mut scenario = Scenario::random(ScenarioKind::NodeCpuHog, &inventory, &mut rng)?;
//! scenario.mutate(&inventory, &mut rng)?;
//!
//! println!("{}", serde_json::to_string_pretty(&scenario.to_spec())?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod evolution;
pub mod rng;
pub mod scenario;
pub mod schema;
pub mod select;

// Re-export commonly used types
pub use evolution::{MockEvaluator, SearchEngine, SearchError};
pub use rng::ScenarioRng;
pub use scenario::{Scenario, ScenarioKind, ScenarioSpec};
pub use schema::{ClusterInventory, EvolutionConfig};
