//! Cluster inventory snapshot types.
//!
//! The inventory is a read-only tree of namespaces (pods, services, volumes,
//! virtual machines) plus top-level nodes. Every leaf carries an `excluded`
//! flag; [`ClusterInventory::active`] projects the snapshot without excluded
//! items and their children.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::select::{PatternError, PatternMatcher};

/// Kubernetes-style label map.
pub type Labels = BTreeMap<String, String>;

/// Snapshot of targetable cluster resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInventory {
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub vms: Vec<VmInstance>,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: u16,
    #[serde(default)]
    pub target_port: Option<TargetPort>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// Backend port of a service: a number or a named container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetPort {
    Number(u16),
    Name(String),
}

impl fmt::Display for TargetPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(port) => write!(f, "{port}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// Persistent volume claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Current usage as a percentage of capacity, when known.
    #[serde(default)]
    pub usage_percent: Option<f64>,
    #[serde(default)]
    pub excluded: bool,
}

/// Virtual machine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmInstance {
    pub name: String,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Free CPU in cores.
    #[serde(default)]
    pub free_cpu: f64,
    /// Free memory in bytes.
    #[serde(default)]
    pub free_memory: f64,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub excluded: bool,
}

/// Node taint. Field order gives the sorted key/value comparison used for
/// de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Taint {
    pub effect: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Pattern expressions scoping which inventory items may be targeted.
///
/// An empty expression matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFilters {
    #[serde(default)]
    pub namespaces: String,
    #[serde(default)]
    pub nodes: String,
    #[serde(default)]
    pub pods: String,
}

impl TargetFilters {
    /// Compile every expression, returning the first failure.
    pub fn compile(&self) -> Result<CompiledFilters, PatternError> {
        Ok(CompiledFilters {
            namespaces: PatternMatcher::from_string(Some(self.namespaces.as_str()), true)?,
            nodes: PatternMatcher::from_string(Some(self.nodes.as_str()), true)?,
            pods: PatternMatcher::from_string(Some(self.pods.as_str()), true)?,
        })
    }

    /// Compile errors of every expression.
    pub fn validate(&self) -> Vec<String> {
        [&self.namespaces, &self.nodes, &self.pods]
            .into_iter()
            .flat_map(|expr| PatternMatcher::validate(expr))
            .collect()
    }
}

/// Compiled [`TargetFilters`].
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    pub namespaces: PatternMatcher,
    pub nodes: PatternMatcher,
    pub pods: PatternMatcher,
}

impl ClusterInventory {
    /// Projection without excluded items. Excluded namespaces drop all of
    /// their children.
    pub fn active(&self) -> ClusterInventory {
        let namespaces = self
            .namespaces
            .iter()
            .filter(|ns| !ns.excluded)
            .map(|ns| Namespace {
                name: ns.name.clone(),
                pods: ns
                    .pods
                    .iter()
                    .filter(|p| !p.excluded)
                    .map(|p| Pod {
                        name: p.name.clone(),
                        labels: p.labels.clone(),
                        containers: p.containers.iter().filter(|c| !c.excluded).cloned().collect(),
                        excluded: false,
                    })
                    .collect(),
                services: ns.services.iter().filter(|s| !s.excluded).cloned().collect(),
                volumes: ns.volumes.iter().filter(|v| !v.excluded).cloned().collect(),
                vms: ns.vms.iter().filter(|v| !v.excluded).cloned().collect(),
                excluded: false,
            })
            .collect();

        let nodes = self.nodes.iter().filter(|n| !n.excluded).cloned().collect();

        ClusterInventory { namespaces, nodes }
    }

    /// Mark items not in scope of `filters` as excluded.
    pub fn apply_filters(&mut self, filters: &CompiledFilters) {
        for ns in &mut self.namespaces {
            if !filters.namespaces.matches(&ns.name) {
                ns.excluded = true;
            }
            for pod in &mut ns.pods {
                if !filters.pods.matches(&pod.name) {
                    pod.excluded = true;
                }
            }
        }
        for node in &mut self.nodes {
            if !filters.nodes.matches(&node.name) {
                node.excluded = true;
            }
        }
    }

    /// Iterate `(namespace, pod)` pairs.
    pub fn pods(&self) -> impl Iterator<Item = (&Namespace, &Pod)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.pods.iter().map(move |pod| (ns, pod)))
    }

    /// Iterate `(namespace, service)` pairs.
    pub fn services(&self) -> impl Iterator<Item = (&Namespace, &Service)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.services.iter().map(move |svc| (ns, svc)))
    }

    /// Iterate `(namespace, volume)` pairs.
    pub fn volumes(&self) -> impl Iterator<Item = (&Namespace, &Volume)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.volumes.iter().map(move |v| (ns, v)))
    }

    /// Iterate `(namespace, vm)` pairs.
    pub fn vms(&self) -> impl Iterator<Item = (&Namespace, &VmInstance)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.vms.iter().map(move |v| (ns, v)))
    }

    /// Every port number exposed by a service, in inventory order.
    pub fn service_ports(&self) -> Vec<u16> {
        self.services()
            .flat_map(|(_, svc)| svc.ports.iter().map(|p| p.port))
            .filter(|&port| port != 0)
            .collect()
    }

    /// Check that names are unique within each parent scope.
    pub fn check_unique_names(&self) -> Result<(), DiscoveryError> {
        fn check<'a>(
            scope: &str,
            names: impl Iterator<Item = &'a str>,
        ) -> Result<(), DiscoveryError> {
            let mut seen = std::collections::BTreeSet::new();
            for name in names {
                if !seen.insert(name) {
                    return Err(DiscoveryError::DuplicateName {
                        scope: scope.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            Ok(())
        }

        check("cluster namespaces", self.namespaces.iter().map(|n| n.name.as_str()))?;
        check("cluster nodes", self.nodes.iter().map(|n| n.name.as_str()))?;
        for ns in &self.namespaces {
            let scope = format!("namespace {}", ns.name);
            check(&scope, ns.pods.iter().map(|p| p.name.as_str()))?;
            check(&scope, ns.services.iter().map(|s| s.name.as_str()))?;
            check(&scope, ns.volumes.iter().map(|v| v.name.as_str()))?;
            check(&scope, ns.vms.iter().map(|v| v.name.as_str()))?;
        }
        Ok(())
    }
}

/// Inventory discovery errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to read inventory snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse inventory snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate name '{name}' in {scope}")]
    DuplicateName { scope: String, name: String },
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),
}

/// Source of cluster inventory snapshots.
pub trait ClusterDiscovery {
    /// Return a fresh snapshot.
    fn discover(&self) -> Result<ClusterInventory, DiscoveryError>;
}

/// Discovery backed by a JSON snapshot on disk.
#[derive(Debug, Clone)]
pub struct SnapshotDiscovery {
    path: PathBuf,
}

impl SnapshotDiscovery {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ClusterDiscovery for SnapshotDiscovery {
    fn discover(&self) -> Result<ClusterInventory, DiscoveryError> {
        let content = fs::read_to_string(&self.path).map_err(|source| DiscoveryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let inventory: ClusterInventory = serde_json::from_str(&content)?;
        inventory.check_unique_names()?;
        Ok(inventory)
    }
}

impl ClusterDiscovery for ClusterInventory {
    fn discover(&self) -> Result<ClusterInventory, DiscoveryError> {
        Ok(self.clone())
    }
}
