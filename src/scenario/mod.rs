//! Scenario genomes.
//!
//! A [`Scenario`] is one concrete chaos experiment: a closed set of variants,
//! each holding typed genes derived from the cluster inventory and from its
//! own randomization rules. Every variant exposes the same capabilities
//! through the [`Genome`] trait: an eligibility check, gene-level
//! randomization, an active parameter view and field-wise crossover.

mod hog;
mod network;
mod node;
mod params;
mod pod;
mod service;
mod storage;
mod vm;
mod zone;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rng::ScenarioRng;
use crate::schema::ClusterInventory;

pub use hog::{NodeCpuHog, NodeIoHog, NodeMemoryHog, NodeTargeting};
pub use network::{
    Directions, FilterTarget, NetworkFilter, PodNetworkChaos, Timing, TrafficFilter, TrafficType,
};
pub use node::{CloudType, NodeAction, NodeActionChoice, NodeSelection};
pub use params::{ChoiceParam, Domain, IntParam, ParamValue, Parameter};
pub use pod::{ContainerKill, ContainerTargeting, PodDisruption, PodTargeting};
pub use service::{HijackTarget, ServiceDisruption, ServiceHijacking};
pub use storage::{FillTarget, PvcFill};
pub use vm::VmOutage;
pub use zone::{ZoneCloud, ZoneOutage};

/// Variant discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    NodeCpuHog,
    NodeMemoryHog,
    NodeIoHog,
    NetworkFilter,
    PodNetworkChaos,
    NodeScenarios,
    ZoneOutages,
    ServiceDisruption,
    ServiceHijacking,
    PodDisruption,
    ContainerKill,
    PvcFill,
    VmOutage,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 13] = [
        Self::NodeCpuHog,
        Self::NodeMemoryHog,
        Self::NodeIoHog,
        Self::NetworkFilter,
        Self::PodNetworkChaos,
        Self::NodeScenarios,
        Self::ZoneOutages,
        Self::ServiceDisruption,
        Self::ServiceHijacking,
        Self::PodDisruption,
        Self::ContainerKill,
        Self::PvcFill,
        Self::VmOutage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeCpuHog => "node-cpu-hog",
            Self::NodeMemoryHog => "node-memory-hog",
            Self::NodeIoHog => "node-io-hog",
            Self::NetworkFilter => "network-filter",
            Self::PodNetworkChaos => "pod-network-chaos",
            Self::NodeScenarios => "node-scenarios",
            Self::ZoneOutages => "zone-outages",
            Self::ServiceDisruption => "service-disruption",
            Self::ServiceHijacking => "service-hijacking",
            Self::PodDisruption => "pod-disruption",
            Self::ContainerKill => "container-kill",
            Self::PvcFill => "pvc-fill",
            Self::VmOutage => "vm-outage",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inventory resource class a variant needs at least one of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    Nodes,
    Pods,
    LabeledPods,
    PodsOrNodes,
    Namespaces,
    Services,
    Volumes,
    VirtualMachines,
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nodes => "nodes",
            Self::Pods => "pods",
            Self::LabeledPods => "labeled pods",
            Self::PodsOrNodes => "pods or nodes",
            Self::Namespaces => "namespaces",
            Self::Services => "services",
            Self::Volumes => "volumes",
            Self::VirtualMachines => "virtual machines",
        })
    }
}

/// No eligible inventory target exists for a variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} needs {class} but the active inventory has none")]
pub struct TargetUnavailable {
    pub kind: ScenarioKind,
    pub class: TargetClass,
}

/// External runner identity a scenario is executed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerTarget {
    pub name: String,
    pub image: String,
}

impl RunnerTarget {
    pub fn hub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            image: format!("quay.io/krkn-chaos/krkn-hub:{name}"),
        }
    }
}

/// Serialized form handed to the scenario runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub kind: ScenarioKind,
    pub runner: RunnerTarget,
    pub parameters: BTreeMap<String, ParamValue>,
}

/// Capabilities shared by every variant.
pub trait Genome: Clone + Default {
    /// Fail-fast eligibility check against the active inventory.
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass>;

    /// Re-derive every inventory-dependent gene, then each remaining gene
    /// with probability `rate`. Only called after [`Genome::check`]
    /// succeeded on the same inventory.
    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass>;

    /// Ordered view of the parameters relevant to the current sub-mode.
    fn parameters(&self) -> Vec<Parameter>;

    fn runner(&self) -> RunnerTarget;

    /// Field-wise crossover: every gene comes from `self` or `other`.
    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self;
}

/// Closed union of chaos experiment variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Scenario {
    NodeCpuHog(NodeCpuHog),
    NodeMemoryHog(NodeMemoryHog),
    NodeIoHog(NodeIoHog),
    NetworkFilter(NetworkFilter),
    PodNetworkChaos(PodNetworkChaos),
    NodeScenarios(NodeAction),
    ZoneOutages(ZoneOutage),
    ServiceDisruption(ServiceDisruption),
    ServiceHijacking(ServiceHijacking),
    PodDisruption(PodDisruption),
    ContainerKill(ContainerKill),
    PvcFill(PvcFill),
    VmOutage(VmOutage),
}

macro_rules! each_variant {
    ($value:expr, $g:ident => $body:expr) => {
        match $value {
            Scenario::NodeCpuHog($g) => $body,
            Scenario::NodeMemoryHog($g) => $body,
            Scenario::NodeIoHog($g) => $body,
            Scenario::NetworkFilter($g) => $body,
            Scenario::PodNetworkChaos($g) => $body,
            Scenario::NodeScenarios($g) => $body,
            Scenario::ZoneOutages($g) => $body,
            Scenario::ServiceDisruption($g) => $body,
            Scenario::ServiceHijacking($g) => $body,
            Scenario::PodDisruption($g) => $body,
            Scenario::ContainerKill($g) => $body,
            Scenario::PvcFill($g) => $body,
            Scenario::VmOutage($g) => $body,
        }
    };
}

fn mutate_genome<G: Genome>(
    genome: &mut G,
    kind: ScenarioKind,
    inventory: &ClusterInventory,
    rng: &mut ScenarioRng,
    rate: f64,
) -> Result<(), TargetUnavailable> {
    let active = inventory.active();
    let unavailable = |class| TargetUnavailable { kind, class };
    G::check(&active).map_err(unavailable)?;

    // Commit only a fully re-derived genome
    let mut next = genome.clone();
    next.randomize(&active, rng, rate).map_err(unavailable)?;
    *genome = next;
    Ok(())
}

impl Scenario {
    /// Empty genome of `kind`, before its first mutation.
    fn blank(kind: ScenarioKind) -> Self {
        match kind {
            ScenarioKind::NodeCpuHog => Self::NodeCpuHog(Default::default()),
            ScenarioKind::NodeMemoryHog => Self::NodeMemoryHog(Default::default()),
            ScenarioKind::NodeIoHog => Self::NodeIoHog(Default::default()),
            ScenarioKind::NetworkFilter => Self::NetworkFilter(Default::default()),
            ScenarioKind::PodNetworkChaos => Self::PodNetworkChaos(Default::default()),
            ScenarioKind::NodeScenarios => Self::NodeScenarios(Default::default()),
            ScenarioKind::ZoneOutages => Self::ZoneOutages(Default::default()),
            ScenarioKind::ServiceDisruption => Self::ServiceDisruption(Default::default()),
            ScenarioKind::ServiceHijacking => Self::ServiceHijacking(Default::default()),
            ScenarioKind::PodDisruption => Self::PodDisruption(Default::default()),
            ScenarioKind::ContainerKill => Self::ContainerKill(Default::default()),
            ScenarioKind::PvcFill => Self::PvcFill(Default::default()),
            ScenarioKind::VmOutage => Self::VmOutage(Default::default()),
        }
    }

    /// Build a valid genome of `kind` bound to `inventory`.
    pub fn random(
        kind: ScenarioKind,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
    ) -> Result<Self, TargetUnavailable> {
        let mut scenario = Self::blank(kind);
        scenario.mutate(inventory, rng)?;
        Ok(scenario)
    }

    /// Eligibility of `kind` against the active view of `inventory`.
    pub fn check(kind: ScenarioKind, inventory: &ClusterInventory) -> Result<(), TargetUnavailable> {
        let active = inventory.active();
        let result = each_variant!(Self::blank(kind), g => check_of(&g, &active));
        result.map_err(|class| TargetUnavailable { kind, class })
    }

    pub fn kind(&self) -> ScenarioKind {
        match self {
            Self::NodeCpuHog(_) => ScenarioKind::NodeCpuHog,
            Self::NodeMemoryHog(_) => ScenarioKind::NodeMemoryHog,
            Self::NodeIoHog(_) => ScenarioKind::NodeIoHog,
            Self::NetworkFilter(_) => ScenarioKind::NetworkFilter,
            Self::PodNetworkChaos(_) => ScenarioKind::PodNetworkChaos,
            Self::NodeScenarios(_) => ScenarioKind::NodeScenarios,
            Self::ZoneOutages(_) => ScenarioKind::ZoneOutages,
            Self::ServiceDisruption(_) => ScenarioKind::ServiceDisruption,
            Self::ServiceHijacking(_) => ScenarioKind::ServiceHijacking,
            Self::PodDisruption(_) => ScenarioKind::PodDisruption,
            Self::ContainerKill(_) => ScenarioKind::ContainerKill,
            Self::PvcFill(_) => ScenarioKind::PvcFill,
            Self::VmOutage(_) => ScenarioKind::VmOutage,
        }
    }

    /// Re-derive every gene from the active inventory.
    pub fn mutate(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
    ) -> Result<(), TargetUnavailable> {
        self.mutate_with_rate(inventory, rng, 1.0)
    }

    /// Re-derive targeting from the active inventory and each
    /// inventory-independent gene with probability `rate`.
    ///
    /// The eligibility check always runs first; on failure the genome is left
    /// untouched.
    pub fn mutate_with_rate(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetUnavailable> {
        let kind = self.kind();
        each_variant!(self, g => mutate_genome(g, kind, inventory, rng, rate))
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        each_variant!(self, g => g.parameters())
    }

    /// Parameters whose value is outside the declared domain.
    pub fn invalid_parameters(&self) -> Vec<Parameter> {
        self.parameters()
            .into_iter()
            .filter(|p| !p.is_valid())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.parameters().iter().all(Parameter::is_valid)
    }

    pub fn runner(&self) -> RunnerTarget {
        each_variant!(self, g => g.runner())
    }

    pub fn to_spec(&self) -> ScenarioSpec {
        ScenarioSpec {
            kind: self.kind(),
            runner: self.runner(),
            parameters: self
                .parameters()
                .into_iter()
                .map(|p| (p.name.to_string(), p.value))
                .collect(),
        }
    }

    /// Stable identity string used to detect duplicate genomes.
    pub fn identity(&self) -> String {
        serde_json::to_string(&self.to_spec()).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Cross two genomes gene by gene. Genomes of different kinds cannot be
    /// crossed; the result is then a copy of `self`.
    pub fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        match (self, other) {
            (Self::NodeCpuHog(a), Self::NodeCpuHog(b)) => Self::NodeCpuHog(a.crossover(b, rng)),
            (Self::NodeMemoryHog(a), Self::NodeMemoryHog(b)) => {
                Self::NodeMemoryHog(a.crossover(b, rng))
            }
            (Self::NodeIoHog(a), Self::NodeIoHog(b)) => Self::NodeIoHog(a.crossover(b, rng)),
            (Self::NetworkFilter(a), Self::NetworkFilter(b)) => {
                Self::NetworkFilter(a.crossover(b, rng))
            }
            (Self::PodNetworkChaos(a), Self::PodNetworkChaos(b)) => {
                Self::PodNetworkChaos(a.crossover(b, rng))
            }
            (Self::NodeScenarios(a), Self::NodeScenarios(b)) => {
                Self::NodeScenarios(a.crossover(b, rng))
            }
            (Self::ZoneOutages(a), Self::ZoneOutages(b)) => Self::ZoneOutages(a.crossover(b, rng)),
            (Self::ServiceDisruption(a), Self::ServiceDisruption(b)) => {
                Self::ServiceDisruption(a.crossover(b, rng))
            }
            (Self::ServiceHijacking(a), Self::ServiceHijacking(b)) => {
                Self::ServiceHijacking(a.crossover(b, rng))
            }
            (Self::PodDisruption(a), Self::PodDisruption(b)) => {
                Self::PodDisruption(a.crossover(b, rng))
            }
            (Self::ContainerKill(a), Self::ContainerKill(b)) => {
                Self::ContainerKill(a.crossover(b, rng))
            }
            (Self::PvcFill(a), Self::PvcFill(b)) => Self::PvcFill(a.crossover(b, rng)),
            (Self::VmOutage(a), Self::VmOutage(b)) => Self::VmOutage(a.crossover(b, rng)),
            _ => self.clone(),
        }
    }
}

fn check_of<G: Genome>(_: &G, inventory: &ClusterInventory) -> Result<(), TargetClass> {
    G::check(inventory)
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runner = self.runner();
        write!(f, "{} [{}]", self.kind(), runner.name)?;
        for p in self.parameters() {
            write!(f, " {}={}", p.name, p.value)?;
        }
        Ok(())
    }
}
