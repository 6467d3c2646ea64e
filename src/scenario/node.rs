//! Infrastructure-level node actions (stop, reboot, kubelet restarts, ...).

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Node};
use crate::select::{TargetSelector, TargetingOptions, select_targets_with};

use super::params::{IntParam, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const RUNS: IntParam = IntParam::new("RUNS", 1, 3);
const TIMEOUT: IntParam = IntParam::new("TIMEOUT", 60, 360);
const DURATION: IntParam = IntParam::new("DURATION", 60, 300);
const MAX_NODES_BY_NAME: usize = 3;

const BAREMETAL_ACTIONS: &[&str] = &[
    "node_stop_start_scenario",
    "node_reboot_scenario",
    "stop_kubelet_scenario",
    "stop_start_kubelet_scenario",
    "restart_kubelet_scenario",
    "node_crash_scenario",
];

const CLOUD_ACTIONS: &[&str] = &[
    "node_stop_start_scenario",
    "node_reboot_scenario",
    "node_termination_scenario",
    "stop_kubelet_scenario",
    "stop_start_kubelet_scenario",
    "restart_kubelet_scenario",
    "node_crash_scenario",
];

/// Infrastructure provider of the nodes, as seen by the node action runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloudType {
    Aws,
    Gcp,
    Azure,
    Vmware,
    IbmCloud,
    #[default]
    BareMetal,
}

impl CloudType {
    const NAMES: &'static [&'static str] = &["aws", "gcp", "azure", "vmware", "ibmcloud", "bm"];

    /// Substrings of label values identifying each provider, in detection
    /// order.
    const MARKERS: [(&'static str, CloudType); 8] = [
        ("eks", Self::Aws),
        ("aws", Self::Aws),
        ("gke", Self::Gcp),
        ("gcp", Self::Gcp),
        ("aks", Self::Azure),
        ("azure", Self::Azure),
        ("vmware", Self::Vmware),
        ("ibm", Self::IbmCloud),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::Vmware => "vmware",
            Self::IbmCloud => "ibmcloud",
            Self::BareMetal => "bm",
        }
    }

    /// Detect from node label values; the first node with a marker decides.
    /// Label keys are not inspected.
    pub fn detect(nodes: &[&Node]) -> Self {
        for node in nodes {
            let texts: Vec<String> = node.labels.values().map(|v| v.to_lowercase()).collect();
            for (marker, cloud) in Self::MARKERS {
                if texts.iter().any(|t| t.contains(marker)) {
                    return cloud;
                }
            }
        }
        Self::BareMetal
    }

    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Self::BareMetal => BAREMETAL_ACTIONS,
            _ => CLOUD_ACTIONS,
        }
    }
}

/// Targeted nodes after the exclusion filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSelection {
    pub selector: TargetSelector,
    pub count: usize,
    pub match_count: usize,
}

impl NodeSelection {
    fn random(nodes: &[&Node], rng: &mut ScenarioRng) -> Result<Self, TargetClass> {
        let options = TargetingOptions {
            max_identity: MAX_NODES_BY_NAME,
            ..Default::default()
        };
        let selection = select_targets_with(nodes, rng, options).ok_or(TargetClass::Nodes)?;
        Ok(Self {
            selector: selection.selector,
            count: selection.count,
            match_count: selection.match_count,
        })
    }

    /// Label selector; a flag-like value renders as the bare key.
    pub fn label_selector(&self) -> String {
        match &self.selector {
            TargetSelector::Label { key, value } if matches!(value.as_str(), "" | "true" | "True") => {
                key.clone()
            }
            TargetSelector::Label { key, value } => format!("{key}={value}"),
            TargetSelector::Identity { .. } => String::new(),
        }
    }
}

/// Provider plus an action it supports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeActionChoice {
    pub cloud: CloudType,
    pub action: String,
}

/// Stop, reboot, terminate or crash nodes, or disturb their kubelet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAction {
    /// Nodes carrying this label key are never targeted.
    pub exclude_label: String,
    pub targeting: NodeSelection,
    pub action: NodeActionChoice,
    pub runs: i64,
    pub timeout: i64,
    pub duration: i64,
}

impl NodeAction {
    fn eligible<'a>(&self, inventory: &'a ClusterInventory) -> Vec<&'a Node> {
        inventory
            .nodes
            .iter()
            .filter(|n| self.exclude_label.is_empty() || !n.labels.contains_key(&self.exclude_label))
            .collect()
    }
}

impl Genome for NodeAction {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.nodes.is_empty() {
            return Err(TargetClass::Nodes);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        let nodes = self.eligible(inventory);
        if nodes.is_empty() {
            log::debug!("no nodes left after excluding label {}", self.exclude_label);
            return Err(TargetClass::Nodes);
        }

        self.targeting = NodeSelection::random(&nodes, rng)?;

        // The provider always follows the nodes; the action is kept only when
        // the provider still supports it.
        let cloud = CloudType::detect(&nodes);
        let supported = cloud.actions().contains(&self.action.action.as_str());
        if !supported || rng.chance(rate) {
            let action = rng
                .choice(cloud.actions())
                .copied()
                .unwrap_or_default()
                .to_string();
            self.action = NodeActionChoice { cloud, action };
        } else {
            self.action.cloud = cloud;
        }
        if rng.chance(rate) {
            self.runs = RUNS.randomize(rng);
        }
        if rng.chance(rate) {
            self.timeout = TIMEOUT.randomize(rng);
        }
        if rng.chance(rate) {
            self.duration = DURATION.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new(
                "ACTION",
                self.action.action.as_str(),
                Domain::OneOf(self.action.cloud.actions()),
            ),
            Parameter::new("LABEL_SELECTOR", self.targeting.label_selector(), Domain::Text),
            Parameter::new("EXCLUDE_LABEL", self.exclude_label.as_str(), Domain::Text),
            Parameter::new(
                "NODE_NAME",
                self.targeting.selector.names().join(","),
                Domain::Text,
            ),
            Parameter::new(
                "INSTANCE_COUNT",
                self.targeting.count,
                Domain::IntRange {
                    min: 1,
                    max: self.targeting.match_count.max(1) as i64,
                },
            ),
            RUNS.bind(self.runs),
            Parameter::new(
                "CLOUD_TYPE",
                self.action.cloud.as_str(),
                Domain::OneOf(CloudType::NAMES),
            ),
            Parameter::new("KUBE_CHECK", true, Domain::Bool),
            TIMEOUT.bind(self.timeout),
            DURATION.bind(self.duration),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("node-scenarios")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            exclude_label: self.exclude_label.clone(),
            targeting: inherit(rng, &self.targeting, &other.targeting),
            action: inherit(rng, &self.action, &other.action),
            runs: inherit(rng, &self.runs, &other.runs),
            timeout: inherit(rng, &self.timeout, &other.timeout),
            duration: inherit(rng, &self.duration, &other.duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::testing::{bare_nodes, full_inventory};
    use crate::schema::Labels;

    fn labeled(name: &str, key: &str, value: &str) -> Node {
        Node {
            name: name.into(),
            labels: Labels::from([(key.to_string(), value.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_cloud_detection() {
        let gke = labeled("a", "cloud.google.com/gke-nodepool", "gke-prod-pool-1");
        assert_eq!(CloudType::detect(&[&gke]), CloudType::Gcp);

        let azure = labeled("b", "kubernetes.azure.com/role", "aks-agent");
        assert_eq!(CloudType::detect(&[&azure]), CloudType::Azure);

        let plain = labeled("c", "role", "worker");
        assert_eq!(CloudType::detect(&[&plain]), CloudType::BareMetal);
        assert_eq!(CloudType::detect(&[]), CloudType::BareMetal);

        let eks = labeled("d", "alpha.eksctl.io/cluster-name", "eks-demo");
        let refs = [&plain, &eks];
        assert_eq!(CloudType::detect(&refs), CloudType::Aws);
    }

    #[test]
    fn test_cloud_markers_in_keys_ignored() {
        let key_only = labeled("a", "eks.amazonaws.com/nodegroup", "workers");
        assert_eq!(CloudType::detect(&[&key_only]), CloudType::BareMetal);

        let nodes = full_inventory().nodes;
        let refs: Vec<&Node> = nodes.iter().collect();
        assert_eq!(CloudType::detect(&refs), CloudType::BareMetal);
    }

    #[test]
    fn test_kept_action_follows_detected_cloud() {
        let aws = ClusterInventory {
            namespaces: Vec::new(),
            nodes: vec![labeled("a", "provider", "aws")],
        };
        let mut action = NodeAction::default();
        let mut rng = ScenarioRng::new(4);
        action.randomize(&aws, &mut rng, 1.0).unwrap();
        action.action.action = "node_termination_scenario".into();

        // Bare metal has no termination action, so it is re-picked even at rate 0
        action.randomize(&bare_nodes(), &mut rng, 0.0).unwrap();
        assert_eq!(action.action.cloud, CloudType::BareMetal);
        assert!(BAREMETAL_ACTIONS.contains(&action.action.action.as_str()));
    }

    #[test]
    fn test_flag_label_renders_key_only() {
        let selection = NodeSelection {
            selector: TargetSelector::Label {
                key: "node-role.kubernetes.io/infra".into(),
                value: String::new(),
            },
            count: 1,
            match_count: 1,
        };
        assert_eq!(selection.label_selector(), "node-role.kubernetes.io/infra");
    }

    #[test]
    fn test_name_targeting_up_to_three() {
        let inventory = bare_nodes();
        for seed in 0..30 {
            let mut rng = ScenarioRng::new(seed);
            let mut action = NodeAction::default();
            action.randomize(&inventory, &mut rng, 1.0).unwrap();
            assert!(action.targeting.selector.is_identity());
            assert!((1..=2).contains(&action.targeting.count));
            assert_eq!(action.action.cloud, CloudType::BareMetal);
            assert!(BAREMETAL_ACTIONS.contains(&action.action.action.as_str()));
        }
    }

    #[test]
    fn test_exclude_label_filters_every_node() {
        let inventory = ClusterInventory {
            namespaces: Vec::new(),
            nodes: vec![labeled("a", "protected", "true")],
        };
        let mut action = NodeAction {
            exclude_label: "protected".into(),
            ..Default::default()
        };
        let mut rng = ScenarioRng::new(0);
        assert_eq!(
            action.randomize(&inventory, &mut rng, 1.0),
            Err(TargetClass::Nodes)
        );
    }
}
