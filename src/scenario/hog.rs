//! Node resource-exhaustion variants (CPU, memory, I/O).

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Node, Taint};
use crate::select::{Selection, TargetSelector, select_targets, taints_json};

use super::params::{CHAOS_DURATION, ChoiceParam, HOG_IMAGE, IntParam, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const CPU_PERCENTAGE: IntParam = IntParam::new("NODE_CPU_PERCENTAGE", 1, 100);
const CPU_CORES: IntParam = IntParam::new("NODE_CPU_CORE", 1, 8);
const MEMORY_PERCENTAGE: IntParam = IntParam::new("MEMORY_CONSUMPTION_PERCENTAGE", 1, 100);
const MEMORY_WORKERS: IntParam = IntParam::new("NUMBER_OF_WORKERS", 1, 10);
const IO_WORKERS: IntParam = IntParam::new("IO_WORKERS", 1, 10);
const IO_BLOCK_SIZE: ChoiceParam =
    ChoiceParam::new("IO_BLOCK_SIZE", &["1m", "4m", "16m", "64m", "128m"]);
const IO_WRITE_BYTES: ChoiceParam =
    ChoiceParam::new("IO_WRITE_BYTES", &["256m", "512m", "1g", "2g", "4g"]);

const HOG_NAMESPACE: &str = "default";
const NODE_MOUNT_PATH: &str = "/root";

/// Node targeting block: selector, counts and carried taints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTargeting {
    pub selector: TargetSelector,
    pub count: usize,
    pub match_count: usize,
    pub taints: Vec<Taint>,
}

impl NodeTargeting {
    pub(crate) fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.nodes.is_empty() {
            return Err(TargetClass::Nodes);
        }
        Ok(())
    }

    pub(crate) fn random(
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
    ) -> Result<Self, TargetClass> {
        let nodes: Vec<&Node> = inventory.nodes.iter().collect();
        let selection = select_targets(&nodes, rng).ok_or(TargetClass::Nodes)?;
        Ok(selection.into())
    }

    /// `key=value` for label targeting, empty otherwise.
    pub fn label_selector(&self) -> String {
        match &self.selector {
            TargetSelector::Label { .. } => self.selector.to_string(),
            TargetSelector::Identity { .. } => String::new(),
        }
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("NODE_SELECTOR", self.selector.to_string(), Domain::NonEmpty),
            Parameter::new(
                "NUMBER_OF_NODES",
                self.count,
                Domain::IntRange {
                    min: 1,
                    max: self.match_count.max(1) as i64,
                },
            ),
            Parameter::new("TAINTS", taints_json(&self.taints), Domain::Json),
        ]
    }
}

impl From<Selection<'_, Node>> for NodeTargeting {
    fn from(selection: Selection<'_, Node>) -> Self {
        Self {
            selector: selection.selector,
            count: selection.count,
            match_count: selection.match_count,
            taints: selection.taints,
        }
    }
}

fn common_parameters(duration: i64) -> Vec<Parameter> {
    vec![
        CHAOS_DURATION.bind(duration),
        Parameter::new("NAMESPACE", HOG_NAMESPACE, Domain::NonEmpty),
        Parameter::new("IMAGE", HOG_IMAGE, Domain::NonEmpty),
    ]
}

/// Saturate CPU on the targeted nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeCpuHog {
    pub targeting: NodeTargeting,
    pub duration: i64,
    pub cpu_percentage: i64,
    pub cpu_cores: i64,
}

impl Genome for NodeCpuHog {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        NodeTargeting::check(inventory)
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.targeting = NodeTargeting::random(inventory, rng)?;
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        if rng.chance(rate) {
            self.cpu_percentage = CPU_PERCENTAGE.randomize(rng);
        }
        if rng.chance(rate) {
            self.cpu_cores = CPU_CORES.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = common_parameters(self.duration);
        params.push(CPU_PERCENTAGE.bind(self.cpu_percentage));
        params.push(CPU_CORES.bind(self.cpu_cores));
        params.extend(self.targeting.parameters());
        params
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("node-cpu-hog")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            duration: inherit(rng, &self.duration, &other.duration),
            cpu_percentage: inherit(rng, &self.cpu_percentage, &other.cpu_percentage),
            cpu_cores: inherit(rng, &self.cpu_cores, &other.cpu_cores),
        }
    }
}

/// Consume memory on the targeted nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMemoryHog {
    pub targeting: NodeTargeting,
    pub duration: i64,
    pub memory_percentage: i64,
    pub workers: i64,
}

impl Genome for NodeMemoryHog {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        NodeTargeting::check(inventory)
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.targeting = NodeTargeting::random(inventory, rng)?;
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        if rng.chance(rate) {
            self.memory_percentage = MEMORY_PERCENTAGE.randomize(rng);
        }
        if rng.chance(rate) {
            self.workers = MEMORY_WORKERS.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = common_parameters(self.duration);
        params.push(MEMORY_PERCENTAGE.bind(self.memory_percentage));
        params.push(MEMORY_WORKERS.bind(self.workers));
        params.extend(self.targeting.parameters());
        params
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("node-memory-hog")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            duration: inherit(rng, &self.duration, &other.duration),
            memory_percentage: inherit(rng, &self.memory_percentage, &other.memory_percentage),
            workers: inherit(rng, &self.workers, &other.workers),
        }
    }
}

/// Generate disk write pressure on the targeted nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeIoHog {
    pub targeting: NodeTargeting,
    pub duration: i64,
    pub block_size: String,
    pub workers: i64,
    pub write_bytes: String,
}

impl Genome for NodeIoHog {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        NodeTargeting::check(inventory)
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.targeting = NodeTargeting::random(inventory, rng)?;
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        if rng.chance(rate) {
            self.block_size = IO_BLOCK_SIZE.randomize(rng);
        }
        if rng.chance(rate) {
            self.workers = IO_WORKERS.randomize(rng);
        }
        if rng.chance(rate) {
            self.write_bytes = IO_WRITE_BYTES.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = common_parameters(self.duration);
        params.push(IO_BLOCK_SIZE.bind(&self.block_size));
        params.push(IO_WORKERS.bind(self.workers));
        params.push(IO_WRITE_BYTES.bind(&self.write_bytes));
        params.push(Parameter::new("NODE_MOUNT_PATH", NODE_MOUNT_PATH, Domain::NonEmpty));
        params.extend(self.targeting.parameters());
        params
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("node-io-hog")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            duration: inherit(rng, &self.duration, &other.duration),
            block_size: inherit(rng, &self.block_size, &other.block_size),
            workers: inherit(rng, &self.workers, &other.workers),
            write_bytes: inherit(rng, &self.write_bytes, &other.write_bytes),
        }
    }
}
