//! Virtual machine instance outage.

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Namespace, VmInstance};

use super::params::{IntParam, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const TIMEOUT: IntParam = IntParam::new("TIMEOUT", 60, 300);
const KILL_COUNT: IntParam = IntParam::new("KILL_COUNT", 1, 3);

/// Kill a virtual machine instance and wait for it to recover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmOutage {
    pub namespace: String,
    pub vm_name: String,
    pub timeout: i64,
    pub kill_count: i64,
}

impl Genome for VmOutage {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.vms().next().is_none() {
            return Err(TargetClass::VirtualMachines);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        let vms: Vec<(&Namespace, &VmInstance)> = inventory.vms().collect();
        let (namespace, vm) = *rng.choice(&vms).ok_or(TargetClass::VirtualMachines)?;
        // Namespace and name move together
        self.namespace = namespace.name.clone();
        self.vm_name = vm.name.clone();
        if rng.chance(rate) {
            self.timeout = TIMEOUT.randomize(rng);
        }
        if rng.chance(rate) {
            self.kill_count = KILL_COUNT.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("NAMESPACE", self.namespace.as_str(), Domain::NonEmpty),
            Parameter::new("VM_NAME", self.vm_name.as_str(), Domain::NonEmpty),
            TIMEOUT.bind(self.timeout),
            KILL_COUNT.bind(self.kill_count),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("kubevirt-outage")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        let from_other = rng.chance(0.5);
        let (namespace, vm_name) = if from_other {
            (other.namespace.clone(), other.vm_name.clone())
        } else {
            (self.namespace.clone(), self.vm_name.clone())
        };
        Self {
            namespace,
            vm_name,
            timeout: inherit(rng, &self.timeout, &other.timeout),
            kill_count: inherit(rng, &self.kill_count, &other.kill_count),
        }
    }
}
