//! Availability-zone outage.

use std::collections::BTreeSet;

use crate::rng::ScenarioRng;
use crate::schema::ClusterInventory;

use super::params::{IntParam, inherit};
use super::{Domain, Genome, Parameter, RunnerTarget, TargetClass};

const DURATION: IntParam = IntParam::new("DURATION", 60, 600);
const CLOUD_NAMES: &[&str] = &["aws", "gcp"];
const ZONE_LABELS: [&str; 2] = [
    "topology.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/zone",
];
const DEFAULT_GCP_ZONE: &str = "us-west1-a";
// Network ids are not part of the inventory; operators replace these.
const AWS_VPC_PLACEHOLDER: &str = "vpc-xxxxxx";
const AWS_SUBNET_PLACEHOLDER: &str = "subnet-xxxxxx";

/// Provider-specific outage target.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneCloud {
    Aws { vpc_id: String, subnet_ids: Vec<String> },
    Gcp { zone: String },
}

impl Default for ZoneCloud {
    fn default() -> Self {
        Self::Gcp {
            zone: String::new(),
        }
    }
}

impl ZoneCloud {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aws { .. } => "aws",
            Self::Gcp { .. } => "gcp",
        }
    }

    fn random(inventory: &ClusterInventory, rng: &mut ScenarioRng) -> Self {
        let guess = rng.choice(CLOUD_NAMES).copied().unwrap_or("aws");
        let cloud = detect_cloud(inventory).unwrap_or(guess);
        log::debug!("zone outage cloud {cloud} (guessed {guess})");

        if cloud == "gcp" {
            let zones: Vec<&str> = inventory
                .nodes
                .iter()
                .flat_map(|n| ZONE_LABELS.iter().filter_map(move |l| n.labels.get(*l)))
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let zone = rng.choice(&zones).copied().unwrap_or(DEFAULT_GCP_ZONE);
            Self::Gcp {
                zone: zone.to_string(),
            }
        } else {
            Self::Aws {
                vpc_id: AWS_VPC_PLACEHOLDER.to_string(),
                subnet_ids: vec![AWS_SUBNET_PLACEHOLDER.to_string()],
            }
        }
    }
}

/// Provider inferred from well-known node label prefixes.
fn detect_cloud(inventory: &ClusterInventory) -> Option<&'static str> {
    let keys = || inventory.nodes.iter().flat_map(|n| n.labels.keys());
    if keys().any(|k| k.starts_with("cloud.google.com/")) {
        Some("gcp")
    } else if keys().any(|k| k.starts_with("eks.amazonaws.com/")) {
        Some("aws")
    } else {
        None
    }
}

/// Take down a whole availability zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneOutage {
    pub cloud: ZoneCloud,
    pub duration: i64,
}

impl Genome for ZoneOutage {
    fn check(_: &ClusterInventory) -> Result<(), TargetClass> {
        Ok(())
    }

    fn randomize(
        &mut self,
        inventory: &ClusterInventory,
        rng: &mut ScenarioRng,
        rate: f64,
    ) -> Result<(), TargetClass> {
        self.cloud = ZoneCloud::random(inventory, rng);
        if rng.chance(rate) {
            self.duration = DURATION.randomize(rng);
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![
            Parameter::new("CLOUD_TYPE", self.cloud.name(), Domain::OneOf(CLOUD_NAMES)),
            DURATION.bind(self.duration),
        ];
        match &self.cloud {
            ZoneCloud::Aws { vpc_id, subnet_ids } => {
                params.push(Parameter::new("VPC_ID", vpc_id.as_str(), Domain::NonEmpty));
                params.push(Parameter::new(
                    "SUBNET_ID",
                    subnet_ids.clone(),
                    Domain::List { min_len: 1 },
                ));
            }
            ZoneCloud::Gcp { zone } => {
                params.push(Parameter::new("ZONE", zone.as_str(), Domain::NonEmpty));
            }
        }
        params.push(Parameter::new("KUBE_CHECK", true, Domain::Bool));
        params
    }

    fn runner(&self) -> RunnerTarget {
        RunnerTarget::hub("zone-outages")
    }

    fn crossover(&self, other: &Self, rng: &mut ScenarioRng) -> Self {
        Self {
            cloud: inherit(rng, &self.cloud, &other.cloud),
            duration: inherit(rng, &self.duration, &other.duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::testing::{bare_nodes, full_inventory};
    use crate::schema::{Labels, Node};

    #[test]
    fn test_gcp_zone_from_labels() {
        let inventory = ClusterInventory {
            namespaces: Vec::new(),
            nodes: vec![Node {
                name: "gke-1".into(),
                labels: Labels::from([
                    ("cloud.google.com/gke-nodepool".to_string(), "default".to_string()),
                    ("topology.kubernetes.io/zone".to_string(), "europe-west1-b".to_string()),
                ]),
                ..Default::default()
            }],
        };
        for seed in 0..10 {
            let mut rng = ScenarioRng::new(seed);
            let cloud = ZoneCloud::random(&inventory, &mut rng);
            assert_eq!(
                cloud,
                ZoneCloud::Gcp {
                    zone: "europe-west1-b".into()
                }
            );
        }
    }

    #[test]
    fn test_aws_detected() {
        let mut rng = ScenarioRng::new(1);
        let cloud = ZoneCloud::random(&full_inventory(), &mut rng);
        assert_eq!(cloud.name(), "aws");
    }

    #[test]
    fn test_guess_without_markers() {
        let mut seen = BTreeSet::new();
        for seed in 0..30 {
            let mut rng = ScenarioRng::new(seed);
            let mut outage = ZoneOutage::default();
            outage.randomize(&bare_nodes(), &mut rng, 1.0).unwrap();
            if let ZoneCloud::Gcp { zone } = &outage.cloud {
                assert_eq!(zone, DEFAULT_GCP_ZONE);
            }
            seen.insert(outage.cloud.name());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_view_follows_provider() {
        let aws = ZoneOutage {
            cloud: ZoneCloud::Aws {
                vpc_id: "vpc-1".into(),
                subnet_ids: vec!["subnet-1".into()],
            },
            duration: 120,
        };
        let names: Vec<&str> = aws.parameters().iter().map(|p| p.name).collect();
        assert!(names.contains(&"VPC_ID"));
        assert!(!names.contains(&"ZONE"));
        assert!(aws.parameters().iter().all(Parameter::is_valid));
    }
}
