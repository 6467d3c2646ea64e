//! Persistent volume fill.

use crate::rng::ScenarioRng;
use crate::schema::{ClusterInventory, Namespace, Volume};

use super::params::{CHAOS_DURATION, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const MAX_FILL_PERCENTAGE: i64 = 99;

/// Volume to fill and the fill level, which always exceeds current usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillTarget {
    pub namespace: String,
    pub claim: String,
    /// Lowest percentage above the observed usage.
    pub min_percentage: i64,
    pub percentage: i64,
}

impl FillTarget {
    fn random(inventory: &ClusterInventory, rng: &mut ScenarioRng) -> Option<Self> {
        let volumes: Vec<(&Namespace, &Volume)> = inventory.volumes().collect();
        let (namespace, volume) = *rng.choice(&volumes)?;
        let min_percentage = volume
            .usage_percent
            .filter(|u| u.is_finite())
            .map(|u| (u.floor() as i64 + 1).clamp(1, MAX_FILL_PERCENTAGE))
            .unwrap_or(1);
        let percentage = rng.randint_inclusive(min_percentage, MAX_FILL_PERCENTAGE);
        Some(Self {
            namespace: namespace.name.clone(),
            claim: volume.name.clone(),
            min_percentage,
            percentage,
        })
    }
}

/// Fill a persistent volume claim up to a percentage of its capacity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvcFill {
    pub target: FillTarget,
    pub duration: i64,
}

impl Genome for PvcFill {
    fn check(inventory: &ClusterInventory) -> Result<(), TargetClass> {
        if inventory.volumes().next().is_none() {
            return Err(TargetClass::Volumes);
        }
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.target = FillTarget::random(inventory, rng).ok_or(TargetClass::Volumes)?;
        if rng.chance(rate) {
            self.duration = CHAOS_DURATION.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("PVC_NAME", self.target.claim.as_str(), Domain::NonEmpty),
            Parameter::new("NAMESPACE", self.target.namespace.as_str(), Domain::NonEmpty),
            Parameter::new(
                "FILL_PERCENTAGE",
                self.target.percentage,
                Domain::IntRange {
                    min: self.target.min_percentage,
                    max: MAX_FILL_PERCENTAGE,
                },
            ),
            CHAOS_DURATION.bind(self.duration),
        ]
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("pvc-scenarios")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            target: inherit(rng, &self.target, &other.target),
            duration: inherit(rng, &self.duration, &other.duration),
        }
    }
}
