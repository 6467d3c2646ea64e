//! Network disruption variants.
//!
//! [`NetworkFilter`] blocks traffic for either pods or nodes; which of the two
//! is decided at mutation time and changes both the exposed parameter set and
//! the runner identity. [`PodNetworkChaos`] always targets labeled pods.

use std::collections::BTreeSet;

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Node, Pod};
use crate::select::{TargetingOptions, select_targets, taints_json};

use super::hog::NodeTargeting;
use super::params::{
    CHAOS_DURATION, ChoiceParam, IntParam, NETWORK_CHAOS_IMAGE, POD_NETWORK_IMAGE, inherit,
    join_ports,
};
use super::pod::{PodTargeting, has_labeled_pods, has_pods};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const EXECUTION: ChoiceParam = ChoiceParam::new("EXECUTION", &["serial", "parallel"]);
const PROTOCOLS: ChoiceParam = ChoiceParam::new("PROTOCOLS", &["tcp", "udp", "tcp,udp"]);
const TEST_DURATION: IntParam = IntParam::new("TEST_DURATION", 30, 300);

/// Ports used when the inventory exposes no service ports.
const FALLBACK_PORTS: &[u16] = &[80, 443, 53, 8080];
const COMMON_PORTS: &[u16] = &[80, 443, 8080, 8443, 3000, 5000, 6379, 5432, 3306, 27017];
const MAX_FILTER_PORTS: usize = 3;

/// Which side a [`NetworkFilter`] is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTarget {
    Pod {
        targeting: PodTargeting,
        interface: String,
    },
    Node {
        targeting: NodeTargeting,
        interface: String,
    },
}

impl Default for FilterTarget {
    fn default() -> Self {
        Self::Pod {
            targeting: PodTargeting::default(),
            interface: String::new(),
        }
    }
}

impl FilterTarget {
    fn random(inventory: &ClusterInventory, rng: &mut ScenarioRng) -> Result<Self, TargetClass> {
        let pods = has_pods(inventory);
        let nodes = !inventory.nodes.is_empty();
        let node_mode = match (pods, nodes) {
            (true, true) => rng.chance(0.5),
            (false, true) => true,
            (true, false) => false,
            (false, false) => return Err(TargetClass::PodsOrNodes),
        };

        if node_mode {
            let candidates: Vec<&Node> = inventory.nodes.iter().collect();
            let selection = select_targets(&candidates, rng).ok_or(TargetClass::PodsOrNodes)?;
            let preferred = selection.matched.first().copied();
            let interface = pick_interface(inventory, preferred, rng);
            Ok(Self::Node {
                targeting: selection.into(),
                interface,
            })
        } else {
            let (targeting, _) =
                PodTargeting::select(inventory, rng, |_| true, TargetingOptions::default())
                    .ok_or(TargetClass::PodsOrNodes)?;
            let interface = pick_interface(inventory, None, rng);
            Ok(Self::Pod {
                targeting,
                interface,
            })
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node { .. })
    }
}

/// Interface of `preferred`, else of the first node that reports any.
fn pick_interface(
    inventory: &ClusterInventory,
    preferred: Option<&Node>,
    rng: &mut ScenarioRng,
) -> String {
    let source = preferred
        .filter(|n| !n.interfaces.is_empty())
        .or_else(|| inventory.nodes.iter().find(|n| !n.interfaces.is_empty()));
    source
        .and_then(|n| rng.choice(&n.interfaces))
        .cloned()
        .unwrap_or_default()
}

/// Up to three distinct observed service ports, or one fallback port.
fn pick_ports(inventory: &ClusterInventory, rng: &mut ScenarioRng) -> Vec<u16> {
    let mut seen = BTreeSet::new();
    let observed: Vec<u16> = inventory
        .service_ports()
        .into_iter()
        .filter(|p| seen.insert(*p))
        .collect();

    if observed.is_empty() {
        return rng.choice(FALLBACK_PORTS).copied().into_iter().collect();
    }
    let count = rng.randint_inclusive(1, observed.len().min(MAX_FILTER_PORTS) as i64) as usize;
    rng.sample(&observed, count).into_iter().copied().collect()
}

/// Traffic directions a filter blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directions {
    pub ingress: bool,
    pub egress: bool,
}

const DIRECTIONS: [Directions; 3] = [
    Directions {
        ingress: true,
        egress: false,
    },
    Directions {
        ingress: false,
        egress: true,
    },
    Directions {
        ingress: true,
        egress: true,
    },
];

/// Block ingress and/or egress traffic of pods or nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkFilter {
    pub target: FilterTarget,
    pub duration: i64,
    pub execution: String,
    pub directions: Directions,
    pub ports: Vec<u16>,
    pub protocols: String,
}

impl Genome for NetworkFilter {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if !has_pods(inventory) && inventory.nodes.is_empty() {
            return Err(TargetClass::PodsOrNodes);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.target = FilterTarget::random(inventory, rng)?;
        self.ports = pick_ports(inventory, rng);
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        if rng.chance(rate) {
            self.execution = EXECUTION.randomize(rng);
        }
        if rng.chance(rate) {
            self.protocols = PROTOCOLS.randomize(rng);
        }
        if rng.chance(rate) {
            self.directions = *rng.choice(&DIRECTIONS).unwrap_or(&DIRECTIONS[1]);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![CHAOS_DURATION.bind(self.duration)];
        let interface = match &self.target {
            FilterTarget::Pod {
                targeting,
                interface,
            } => {
                params.push(Parameter::new(
                    "NAMESPACE",
                    targeting.namespace.as_str(),
                    Domain::NonEmpty,
                ));
                params.push(Parameter::new(
                    "POD_SELECTOR",
                    targeting.label_selector(),
                    Domain::Text,
                ));
                params.push(Parameter::new("POD_NAME", targeting.pod_name(), Domain::Text));
                params.push(targeting.count_parameter("INSTANCE_COUNT"));
                interface
            }
            FilterTarget::Node {
                targeting,
                interface,
            } => {
                params.push(Parameter::new(
                    "NODE_SELECTOR",
                    targeting.label_selector(),
                    Domain::Text,
                ));
                params.push(Parameter::new(
                    "NODE_NAME",
                    targeting.selector.names().join(","),
                    Domain::Text,
                ));
                params.push(Parameter::new(
                    "INSTANCE_COUNT",
                    targeting.count,
                    Domain::IntRange {
                        min: 1,
                        max: targeting.match_count.max(1) as i64,
                    },
                ));
                interface
            }
        };
        params.extend([
            EXECUTION.bind(&self.execution),
            Parameter::new("INGRESS", self.directions.ingress, Domain::Bool),
            Parameter::new("EGRESS", self.directions.egress, Domain::Bool),
            Parameter::new("INTERFACES", interface.as_str(), Domain::Text),
            Parameter::new(
                "PORTS",
                join_ports(&self.ports),
                Domain::Ports { allow_empty: false },
            ),
            Parameter::new("IMAGE", NETWORK_CHAOS_IMAGE, Domain::NonEmpty),
            PROTOCOLS.bind(&self.protocols),
        ]);
        let taints = match &self.target {
            FilterTarget::Node { targeting, .. } => taints_json(&targeting.taints),
            FilterTarget::Pod { .. } => "[]".to_string(),
        };
        params.push(Parameter::new("TAINTS", taints, Domain::Json));
        params
    }

    fn runner(&self) -> RunnerTarget {
        if self.target.is_node() {
            RunnerTarget::hub("node-network-filter")
        } else {
            RunnerTarget::hub("pod-network-filter")
        }
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            target: inherit(rng, &self.target, &other.target),
            duration: inherit(rng, &self.duration, &other.duration),
            execution: inherit(rng, &self.execution, &other.execution),
            directions: inherit(rng, &self.directions, &other.directions),
            ports: inherit(rng, &self.ports, &other.ports),
            protocols: inherit(rng, &self.protocols, &other.protocols),
        }
    }
}

/// Direction of traffic disrupted by [`PodNetworkChaos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrafficType {
    #[default]
    Ingress,
    Egress,
    Both,
}

impl TrafficType {
    const ALL: [TrafficType; 3] = [Self::Ingress, Self::Egress, Self::Both];
    const NAMES: &'static [&'static str] = &["[ingress]", "[egress]", "[ingress,egress]"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => Self::NAMES[0],
            Self::Egress => Self::NAMES[1],
            Self::Both => Self::NAMES[2],
        }
    }

    pub fn has_ingress(&self) -> bool {
        matches!(self, Self::Ingress | Self::Both)
    }

    pub fn has_egress(&self) -> bool {
        matches!(self, Self::Egress | Self::Both)
    }
}

/// Traffic direction plus optional per-direction port filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficFilter {
    pub traffic: TrafficType,
    pub ingress_ports: Vec<u16>,
    pub egress_ports: Vec<u16>,
}

impl TrafficFilter {
    fn random(rng: &mut ScenarioRng) -> Self {
        let traffic = *rng.choice(&TrafficType::ALL).unwrap_or(&TrafficType::Ingress);
        let mut filter = Self {
            traffic,
            ..Default::default()
        };
        filter.randomize_ports(rng);
        filter
    }

    /// Ports follow the chosen traffic type; half the time no filter is set.
    fn randomize_ports(&mut self, rng: &mut ScenarioRng) {
        self.ingress_ports.clear();
        self.egress_ports.clear();
        if !rng.chance(0.5) {
            return;
        }
        if self.traffic.has_ingress() {
            self.ingress_ports = common_ports(rng);
        }
        if self.traffic.has_egress() {
            self.egress_ports = common_ports(rng);
        }
    }
}

fn common_ports(rng: &mut ScenarioRng) -> Vec<u16> {
    let count = rng.randint_inclusive(1, MAX_FILTER_PORTS as i64) as usize;
    rng.sample(COMMON_PORTS, count).into_iter().copied().collect()
}

/// Test and wait windows. The wait covers twice the test plus slack.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    pub test_duration: i64,
    pub wait_duration: i64,
}

impl Timing {
    fn random(rng: &mut ScenarioRng) -> Self {
        let test_duration = TEST_DURATION.randomize(rng);
        let wait_duration = test_duration * 2 + rng.randint_inclusive(0, 60);
        Self {
            test_duration,
            wait_duration,
        }
    }

    fn wait_domain(&self) -> Domain {
        Domain::IntRange {
            min: self.test_duration * 2,
            max: self.test_duration * 2 + 60,
        }
    }
}

/// Disrupt traffic of labeled pods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodNetworkChaos {
    pub targeting: PodTargeting,
    pub filter: TrafficFilter,
    pub timing: Timing,
}

impl Genome for PodNetworkChaos {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if !has_labeled_pods(inventory) {
            return Err(TargetClass::LabeledPods);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        let labeled = |p: &Pod| !p.labels.is_empty();
        let (targeting, _) =
            PodTargeting::select(inventory, rng, labeled, TargetingOptions::default())
                .ok_or(TargetClass::LabeledPods)?;
        self.targeting = targeting;
        if rng.chance(rate) {
            self.filter = TrafficFilter::random(rng);
        } else if rng.chance(rate) {
            self.filter.randomize_ports(rng);
        }
        if rng.chance(rate) {
            self.timing = Timing::random(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let traffic = &self.filter.traffic;
        vec![
            Parameter::new("NAMESPACE", self.targeting.namespace.as_str(), Domain::NonEmpty),
            Parameter::new("IMAGE", POD_NETWORK_IMAGE, Domain::NonEmpty),
            Parameter::new("LABEL_SELECTOR", self.targeting.label_selector(), Domain::Text),
            Parameter::new("EXCLUDE_LABEL", "", Domain::Text),
            Parameter::new("POD_NAME", self.targeting.pod_name(), Domain::Text),
            self.targeting.count_parameter("INSTANCE_COUNT"),
            Parameter::new(
                "TRAFFIC_TYPE",
                traffic.as_str(),
                Domain::OneOf(TrafficType::NAMES),
            ),
            Parameter::new(
                "INGRESS_PORTS",
                join_ports(&self.filter.ingress_ports),
                Domain::Ports {
                    allow_empty: true,
                },
            ),
            Parameter::new(
                "EGRESS_PORTS",
                join_ports(&self.filter.egress_ports),
                Domain::Ports {
                    allow_empty: true,
                },
            ),
            Parameter::new(
                "WAIT_DURATION",
                self.timing.wait_duration,
                self.timing.wait_domain(),
            ),
            TEST_DURATION.bind(self.timing.test_duration),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("pod-network-chaos")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            filter: inherit(rng, &self.filter, &other.filter),
            timing: inherit(rng, &self.timing, &other.timing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::testing::{bare_nodes, full_inventory};

    #[test]
    fn test_mode_follows_inventory() {
        let mut rng = ScenarioRng::new(1);
        let mut filter = NetworkFilter::default();
        filter.randomize(&bare_nodes(), &mut rng, 1.0).unwrap();
        assert!(filter.target.is_node());
        assert_eq!(filter.runner().name, "node-network-filter");

        let mut pods_only = full_inventory();
        pods_only.nodes.clear();
        filter.randomize(&pods_only, &mut rng, 1.0).unwrap();
        assert!(!filter.target.is_node());
        assert_eq!(filter.runner().name, "pod-network-filter");
        assert!(filter.parameters().iter().any(|p| p.name == "POD_SELECTOR"));
    }

    #[test]
    fn test_both_modes_reachable() {
        let inventory = full_inventory();
        let mut modes = BTreeSet::new();
        for seed in 0..40 {
            let mut rng = ScenarioRng::new(seed);
            let mut filter = NetworkFilter::default();
            filter.randomize(&inventory, &mut rng, 1.0).unwrap();
            modes.insert(filter.target.is_node());
        }
        assert_eq!(modes.len(), 2);
    }

    #[test]
    fn test_ports_from_services() {
        let inventory = full_inventory();
        for seed in 0..30 {
            let mut rng = ScenarioRng::new(seed);
            let ports = pick_ports(&inventory, &mut rng);
            assert!((1..=3).contains(&ports.len()));
            assert!(ports.iter().all(|p| [80, 7070, 9090].contains(p)));
            let distinct: BTreeSet<_> = ports.iter().collect();
            assert_eq!(distinct.len(), ports.len());
        }

        let mut rng = ScenarioRng::new(0);
        let fallback = pick_ports(&bare_nodes(), &mut rng);
        assert_eq!(fallback.len(), 1);
        assert!(FALLBACK_PORTS.contains(&fallback[0]));
    }

    #[test]
    fn test_some_direction_always_enabled() {
        let inventory = full_inventory();
        let mut rng = ScenarioRng::new(12);
        for _ in 0..30 {
            let mut filter = NetworkFilter::default();
            filter.randomize(&inventory, &mut rng, 1.0).unwrap();
            assert!(filter.directions.ingress || filter.directions.egress);
        }
    }

    #[test]
    fn test_ports_follow_traffic_type() {
        let mut rng = ScenarioRng::new(21);
        for _ in 0..50 {
            let filter = TrafficFilter::random(&mut rng);
            if !filter.traffic.has_ingress() {
                assert!(filter.ingress_ports.is_empty());
            }
            if !filter.traffic.has_egress() {
                assert!(filter.egress_ports.is_empty());
            }
        }
    }

    #[test]
    fn test_wait_covers_test_window() {
        let mut rng = ScenarioRng::new(3);
        for _ in 0..50 {
            let timing = Timing::random(&mut rng);
            assert!(timing.wait_duration >= timing.test_duration * 2);
            assert!(timing.wait_duration <= timing.test_duration * 2 + 60);
        }
    }
}
