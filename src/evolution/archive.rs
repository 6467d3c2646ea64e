//! Archive of the best distinct scenarios found during a run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schema::ScenarioSnapshot;

/// Best distinct scenarios, best first.
///
/// Two snapshots are the same scenario when their runner specs are equal;
/// only the better-scoring copy is kept.
#[derive(Debug, Clone, Default)]
pub struct ScenarioArchive {
    entries: Vec<ScenarioSnapshot>,
    max_size: usize,
}

/// On-disk form of an archived scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioExport {
    pub rank: usize,
    #[serde(flatten)]
    pub snapshot: ScenarioSnapshot,
}

impl ScenarioArchive {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Offer a scored snapshot. Returns true if it entered the archive.
    pub fn offer(&mut self, snapshot: ScenarioSnapshot) -> bool {
        let Some(fitness) = snapshot.fitness.filter(|f| f.is_finite()) else {
            return false;
        };

        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.scenario == snapshot.scenario)
        {
            if self.entries[pos].fitness.is_some_and(|f| f >= fitness) {
                return false;
            }
            self.entries.remove(pos);
        } else if self.entries.len() >= self.max_size
            && self
                .entries
                .last()
                .and_then(|e| e.fitness)
                .is_some_and(|worst| worst >= fitness)
        {
            return false;
        }

        // Stable insert: earlier entries win ties.
        let at = self
            .entries
            .iter()
            .position(|e| e.fitness.is_none_or(|f| f < fitness))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, snapshot);
        self.entries.truncate(self.max_size);
        true
    }

    pub fn best(&self) -> Option<&ScenarioSnapshot> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[ScenarioSnapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry as `scenario_<rank>_<kind>.json` into `dir`.
    pub fn export<P: AsRef<Path>>(&self, dir: P) -> io::Result<Vec<PathBuf>> {
        export_snapshots(&self.entries, dir)
    }

    /// Load an exported archive back, best first.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P, max_size: usize) -> io::Result<Self> {
        let mut exports = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                match load_export(&path) {
                    Ok(export) => exports.push(export),
                    Err(e) => log::warn!("skipping {}: {e}", path.display()),
                }
            }
        }
        exports.sort_by_key(|e| e.rank);

        let mut archive = Self::new(max_size);
        for export in exports {
            archive.offer(export.snapshot);
        }
        Ok(archive)
    }
}

/// Write snapshots, in order, as ranked JSON files.
pub fn export_snapshots<P: AsRef<Path>>(
    snapshots: &[ScenarioSnapshot],
    dir: P,
) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(snapshots.len());
    for (i, snapshot) in snapshots.iter().enumerate() {
        let rank = i + 1;
        let path = dir.join(format!("scenario_{rank}_{}.json", snapshot.scenario.kind));
        let export = ScenarioExport {
            rank,
            snapshot: snapshot.clone(),
        };
        fs::write(&path, serde_json::to_string_pretty(&export)?)?;
        paths.push(path);
    }
    log::info!("exported {} scenarios to {}", paths.len(), dir.display());
    Ok(paths)
}

fn load_export(path: &Path) -> io::Result<ScenarioExport> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScenarioRng;
    use crate::scenario::testing::full_inventory;
    use crate::scenario::{Scenario, ScenarioKind};

    fn snapshot(id: u64, seed: u64, fitness: Option<f64>) -> ScenarioSnapshot {
        let mut rng = ScenarioRng::new(seed);
        let scenario =
            Scenario::random(ScenarioKind::NodeCpuHog, &full_inventory(), &mut rng).unwrap();
        ScenarioSnapshot {
            id,
            fitness,
            generation: 0,
            parents: Vec::new(),
            scenario: scenario.to_spec(),
        }
    }

    #[test]
    fn test_keeps_best_first() {
        let mut archive = ScenarioArchive::new(10);
        archive.offer(snapshot(1, 1, Some(0.3)));
        archive.offer(snapshot(2, 2, Some(0.7)));
        archive.offer(snapshot(3, 3, Some(0.5)));

        let ids: Vec<u64> = archive.entries().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(archive.best().unwrap().id, 2);
    }

    #[test]
    fn test_capacity_evicts_worst() {
        let mut archive = ScenarioArchive::new(2);
        archive.offer(snapshot(1, 1, Some(0.3)));
        archive.offer(snapshot(2, 2, Some(0.5)));
        assert!(!archive.offer(snapshot(3, 3, Some(0.1))));
        assert!(archive.offer(snapshot(4, 4, Some(0.9))));

        let ids: Vec<u64> = archive.entries().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut archive = ScenarioArchive::new(5);
        archive.offer(snapshot(1, 7, Some(0.4)));
        assert!(!archive.offer(snapshot(2, 7, Some(0.2))));
        assert!(archive.offer(snapshot(3, 7, Some(0.8))));
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.best().unwrap().id, 3);
    }

    #[test]
    fn test_failed_evaluations_ignored() {
        let mut archive = ScenarioArchive::new(5);
        assert!(!archive.offer(snapshot(1, 1, None)));
        assert!(archive.is_empty());
    }

    #[test]
    fn test_export_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = ScenarioArchive::new(5);
        archive.offer(snapshot(1, 1, Some(0.3)));
        archive.offer(snapshot(2, 2, Some(0.6)));

        let paths = archive.export(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("scenario_1_node-cpu-hog.json"));

        let content = fs::read_to_string(&paths[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["rank"], 1);
        assert_eq!(value["scenario"]["kind"], "node-cpu-hog");

        let reloaded = ScenarioArchive::load_from_dir(dir.path(), 5).unwrap();
        assert_eq!(reloaded.entries(), archive.entries());
    }
}
