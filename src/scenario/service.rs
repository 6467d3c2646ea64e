//! Service-level variants: bulk deletion and traffic hijacking.

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Namespace, Service};
use crate::select::select_targets;

use super::params::{CHAOS_DURATION, IntParam, SERVICE_HIJACKING_IMAGE, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const DELETE_COUNT: IntParam = IntParam::new("DELETE_COUNT", 1, 5);
const RUNS: IntParam = IntParam::new("RUNS", 1, 3);
const DEFAULT_TARGET_PORT: &str = "80";

/// Delete objects in a namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDisruption {
    pub namespace: String,
    pub delete_count: i64,
    pub runs: i64,
}

impl Genome for ServiceDisruption {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.namespaces.is_empty() {
            return Err(TargetClass::Namespaces);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        let namespaces: Vec<&Namespace> = inventory.namespaces.iter().collect();
        let selection = select_targets(&namespaces, rng).ok_or(TargetClass::Namespaces)?;
        self.namespace = selection.selector.bare();
        if rng.chance(rate) {
            self.delete_count = DELETE_COUNT.randomize(rng);
        }
        if rng.chance(rate) {
            self.runs = RUNS.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("NAMESPACE", self.namespace.as_str(), Domain::NonEmpty),
            DELETE_COUNT.bind(self.delete_count),
            RUNS.bind(self.runs),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("service-disruption-scenarios")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            namespace: inherit(rng, &self.namespace, &other.namespace),
            delete_count: inherit(rng, &self.delete_count, &other.delete_count),
            runs: inherit(rng, &self.runs, &other.runs),
        }
    }
}

/// Service plus the port whose traffic is redirected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HijackTarget {
    pub namespace: String,
    pub service: String,
    pub port: String,
}

impl HijackTarget {
    fn random(inventory: &ClusterInventory, rng: &mut ScenarioRng) -> Option<Self> {
        let services: Vec<(&Namespace, &Service)> = inventory.services().collect();
        let (namespace, service) = *rng.choice(&services)?;
        let ports: Vec<u16> = service
            .ports
            .iter()
            .map(|p| p.port)
            .filter(|&p| p != 0)
            .collect();
        let port = rng
            .choice(&ports)
            .map(u16::to_string)
            .unwrap_or_else(|| DEFAULT_TARGET_PORT.to_string());
        Some(Self {
            namespace: namespace.name.clone(),
            service: service.name.clone(),
            port,
        })
    }
}

/// Replace a service's backend with a responder serving canned traffic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceHijacking {
    pub target: HijackTarget,
    pub duration: i64,
}

impl Genome for ServiceHijacking {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.services().next().is_none() {
            return Err(TargetClass::Services);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.target = HijackTarget::random(inventory, rng).ok_or(TargetClass::Services)?;
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("SERVICE_NAME", self.target.service.as_str(), Domain::NonEmpty),
            Parameter::new(
                "SERVICE_NAMESPACE",
                self.target.namespace.as_str(),
                Domain::NonEmpty,
            ),
            Parameter::new(
                "SERVICE_TARGET_PORT",
                self.target.port.as_str(),
                Domain::Ports { allow_empty: false },
            ),
            Parameter::new("IMAGE", SERVICE_HIJACKING_IMAGE, Domain::NonEmpty),
            CHAOS_DURATION.bind(self.duration),
            Parameter::new("PRIVILEGED", true, Domain::Bool),
            Parameter::new("SCENARIO_FILE_PATH", "", Domain::Text),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("service-hijacking")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            target: inherit(rng, &self.target, &other.target),
            duration: inherit(rng, &self.duration, &other.duration),
        }
    }
}
