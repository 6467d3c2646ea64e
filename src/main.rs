//! Chaos Search CLI - Run a scenario search from JSON configuration.

use std::fs;
use std::path::PathBuf;

use chaos_search::{
    evolution::{MockEvaluator, SearchEngine, export_snapshots},
    schema::{EvolutionConfig, SnapshotDiscovery},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 3 {
        eprintln!("Usage: {} <config.json> <inventory.json>", args[0]);
        eprintln!();
        eprintln!("Search for high-impact chaos scenarios against a cluster inventory.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json     Path to search configuration file");
        eprintln!("  inventory.json  Path to cluster inventory snapshot");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let inventory_path = PathBuf::from(&args[2]);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });
    let output_dir = config.archive.output_dir.clone();

    let discovery = SnapshotDiscovery::new(&inventory_path);
    let mut engine = SearchEngine::discover(config, &discovery, MockEvaluator::new())
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let result = engine
        .run_with_callback(|progress| {
            eprintln!(
                "  Generation {}/{}: best={:?} avg={:?} stagnation={}",
                progress.generation,
                progress.total_generations,
                progress.best_fitness,
                progress.avg_fitness,
                progress.stagnation_count
            );
        })
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    for excluded in &result.excluded {
        eprintln!("Excluded {}: no {}", excluded.kind, excluded.class);
    }
    eprintln!(
        "Stopped after {} generations ({:?}), {} evaluations in {:.2}s",
        result.stats.generations,
        result.stats.stop_reason,
        result.stats.total_evaluations,
        result.stats.elapsed_seconds
    );

    if let Some(dir) = output_dir {
        match export_snapshots(&result.archive, &dir) {
            Ok(paths) => eprintln!("Archived {} scenarios to {}", paths.len(), dir),
            Err(e) => {
                eprintln!("Error exporting archive: {}", e);
                std::process::exit(1);
            }
        }
    }

    match &result.best {
        Some(best) => match serde_json::to_string_pretty(best) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("No scenario was scored");
            std::process::exit(2);
        }
    }
}

fn print_example_config() {
    let config = EvolutionConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
