//! Pod-level disruption variants and the shared pod targeting block.

use std::collections::BTreeSet;

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Namespace, Pod};
use crate::select::{TargetSelector, TargetingOptions, select_targets_with};

use super::params::{ChoiceParam, IntParam, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const KILL_TIMEOUT: IntParam = IntParam::new("KILL_TIMEOUT", 60, 180);
const RECOVERY_TIME: IntParam = IntParam::new("EXPECTED_RECOVERY_TIME", 30, 120);
const KILL_SIGNAL: ChoiceParam = ChoiceParam::new("ACTION", &["1", "9", "15"]);

/// Namespace plus pods targeted within it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodTargeting {
    pub namespace: String,
    pub selector: TargetSelector,
    pub count: usize,
    pub match_count: usize,
}

impl PodTargeting {
    /// Pick a namespace holding eligible pods, then target pods inside it.
    ///
    /// Returns the targeted pods alongside the block.
    pub(crate) fn select<'a>(
        inventory: &'a ClusterInventory,
        rng: &mut ScenarioRng,
        eligible: impl Fn(&Pod) -> bool,
        options: TargetingOptions,
    ) -> Option<(Self, Vec<&'a Pod>)> {
        let namespaces: Vec<&Namespace> = inventory
            .namespaces
            .iter()
            .filter(|ns| ns.pods.iter().any(&eligible))
            .collect();
        let namespace = *rng.choice(&namespaces)?;

        let pods: Vec<&Pod> = namespace.pods.iter().filter(|p| eligible(p)).collect();
        let selection = select_targets_with(&pods, rng, options)?;
        log::debug!(
            "pod targeting in {}: {} ({} of {})",
            namespace.name,
            selection.selector,
            selection.count,
            selection.match_count
        );

        let block = Self {
            namespace: namespace.name.clone(),
            selector: selection.selector,
            count: selection.count,
            match_count: selection.match_count,
        };
        Some((block, selection.matched))
    }

    /// `key=value` for label targeting, empty otherwise.
    pub fn label_selector(&self) -> String {
        match &self.selector {
            TargetSelector::Label { .. } => self.selector.to_string(),
            TargetSelector::Identity { .. } => String::new(),
        }
    }

    /// Pod name for identity targeting, empty otherwise.
    pub fn pod_name(&self) -> String {
        self.selector.names().join(",")
    }

    pub(crate) fn count_parameter(&self, name: &'static str) -> Parameter {
        Parameter::new(
            name,
            self.count,
            Domain::IntRange {
                min: 1,
                max: self.match_count.max(1) as i64,
            },
        )
    }
}

pub(crate) fn has_pods(inventory: &ClusterInventory) -> bool {
    inventory.pods().next().is_some()
}

pub(crate) fn has_labeled_pods(inventory: &ClusterInventory) -> bool {
    inventory.pods().any(|(_, p)| !p.labels.is_empty())
}

/// Delete pods selected by name or label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodDisruption {
    pub targeting: PodTargeting,
    pub kill_timeout: i64,
    pub recovery_time: i64,
}

impl Genome for PodDisruption {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if !has_pods(inventory) {
            return Err(TargetClass::Pods);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        let (targeting, _) =
            PodTargeting::select(inventory, rng, |_| true, TargetingOptions::default())
                .ok_or(TargetClass::Pods)?;
        self.targeting = targeting;
        if rng.chance(rate) {
            self.kill_timeout = KILL_TIMEOUT.randomize(rng);
        }
        if rng.chance(rate) {
            self.recovery_time = RECOVERY_TIME.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let name_pattern = if self.targeting.selector.is_identity() {
            self.targeting.pod_name()
        } else {
            ".*".to_string()
        };
        vec![
            Parameter::new("NAMESPACE", self.targeting.namespace.as_str(), Domain::NonEmpty),
            Parameter::new("POD_LABEL", self.targeting.label_selector(), Domain::Text),
            Parameter::new("NAME_PATTERN", name_pattern, Domain::NonEmpty),
            self.targeting.count_parameter("DISRUPTION_COUNT"),
            KILL_TIMEOUT.bind(self.kill_timeout),
            RECOVERY_TIME.bind(self.recovery_time),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("pod-scenarios")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            kill_timeout: inherit(rng, &self.kill_timeout, &other.kill_timeout),
            recovery_time: inherit(rng, &self.recovery_time, &other.recovery_time),
        }
    }
}

/// Container targeting: labeled pods plus one container name they run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerTargeting {
    pub pods: PodTargeting,
    pub container: String,
}

fn killable(pod: &Pod) -> bool {
    !pod.labels.is_empty() && !pod.containers.is_empty()
}

/// Signal one container inside labeled pods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerKill {
    pub targeting: ContainerTargeting,
    pub signal: String,
    pub recovery_time: i64,
}

impl Genome for ContainerKill {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if !inventory.pods().any(|(_, p)| killable(p)) {
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
        // Container selection needs a label selector
        let options = TargetingOptions {
            identity_probability: 0.0,
            ..Default::default()
        };
        let (pods, matched) = PodTargeting::select(inventory, rng, killable, options)
            .ok_or(TargetClass::LabeledPods)?;
        let containers: Vec<&str> = matched
            .iter()
            .flat_map(|p| p.containers.iter().map(|c| c.name.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let container = rng
            .choice(&containers)
            .ok_or(TargetClass::LabeledPods)?
            .to_string();
        self.targeting = ContainerTargeting { pods, container };
        if rng.chance(rate) {
            self.signal = KILL_SIGNAL.randomize(rng);
        }
        if rng.chance(rate) {
            self.recovery_time = RECOVERY_TIME.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let pods = &self.targeting.pods;
        vec![
            Parameter::new("NAMESPACE", pods.namespace.as_str(), Domain::NonEmpty),
            Parameter::new("LABEL_SELECTOR", pods.label_selector(), Domain::NonEmpty),
            pods.count_parameter("DISRUPTION_COUNT"),
            Parameter::new(
                "CONTAINER_NAME",
                self.targeting.container.as_str(),
                Domain::NonEmpty,
            ),
            KILL_SIGNAL.bind(&self.signal),
            RECOVERY_TIME.bind(self.recovery_time),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("container-scenarios")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            targeting: inherit(rng, &self.targeting, &other.targeting),
            signal: inherit(rng, &self.signal, &other.signal),
            recovery_time: inherit(rng, &self.recovery_time, &other.recovery_time),
        }
    }
}
