//! Target selection shared by every scenario variant.
//!
//! Given candidate resources with label maps, either one candidate is picked
//! and addressed by identity, or a `label=value` pair is drawn from the
//! candidates' label pool and a random number of the candidates carrying that
//! pair is targeted. All draws go through the shared [`ScenarioRng`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rng::ScenarioRng;
use crate::schema::{Labels, Namespace, Node, Pod, Taint};

static NO_LABELS: Labels = BTreeMap::new();

/// A resource that can be targeted by identity or label.
pub trait Targetable {
    /// Label key used when addressing a single resource by identity, if any.
    const IDENTITY_KEY: Option<&'static str>;

    fn name(&self) -> &str;

    fn labels(&self) -> &Labels;

    /// Secondary attributes carried along with a selection.
    fn taints(&self) -> &[Taint] {
        &[]
    }
}

impl Targetable for Node {
    const IDENTITY_KEY: Option<&'static str> = Some("kubernetes.io/hostname");

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn taints(&self) -> &[Taint] {
        &self.taints
    }
}

impl Targetable for Pod {
    const IDENTITY_KEY: Option<&'static str> = None;

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &Labels {
        &self.labels
    }
}

impl Targetable for Namespace {
    const IDENTITY_KEY: Option<&'static str> = None;

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &Labels {
        &NO_LABELS
    }
}

/// How the targeted resources are addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetSelector {
    /// By name. `key` is the identity label (e.g. hostname) when one exists.
    Identity {
        key: Option<String>,
        names: Vec<String>,
    },
    /// By a shared `key=value` label.
    Label { key: String, value: String },
}

impl Default for TargetSelector {
    fn default() -> Self {
        Self::Identity {
            key: None,
            names: Vec::new(),
        }
    }
}

impl TargetSelector {
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity { .. })
    }

    /// Targeted names for identity selectors, empty for label selectors.
    pub fn names(&self) -> &[String] {
        match self {
            Self::Identity { names, .. } => names,
            Self::Label { .. } => &[],
        }
    }

    /// Selector rendered without the identity key (bare names).
    pub fn bare(&self) -> String {
        match self {
            Self::Identity { names, .. } => names.join(","),
            Self::Label { key, value } => format!("{key}={value}"),
        }
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity {
                key: Some(key),
                names,
            } => write!(f, "{key}={}", names.join(",")),
            Self::Identity { key: None, names } => write!(f, "{}", names.join(",")),
            Self::Label { key, value } => write!(f, "{key}={value}"),
        }
    }
}

/// Tuning for [`select_targets_with`].
#[derive(Debug, Clone, Copy)]
pub struct TargetingOptions {
    /// Upper bound on resources targeted by identity.
    pub max_identity: usize,
    /// Probability of identity targeting when labels are available.
    pub identity_probability: f64,
}

impl Default for TargetingOptions {
    fn default() -> Self {
        Self {
            max_identity: 1,
            identity_probability: 0.5,
        }
    }
}

/// Outcome of a target selection.
#[derive(Debug, Clone)]
pub struct Selection<'a, T> {
    pub selector: TargetSelector,
    /// Number of resources targeted.
    pub count: usize,
    /// Number of candidates the selector matches (before sampling).
    pub match_count: usize,
    /// De-duplicated taints of the targeted resources.
    pub taints: Vec<Taint>,
    /// Targeted resources.
    pub matched: Vec<&'a T>,
}

impl<T> Selection<'_, T> {
    /// Taints as a JSON list.
    pub fn taints_json(&self) -> String {
        taints_json(&self.taints)
    }
}

/// Serialize taints as a JSON list.
pub fn taints_json(taints: &[Taint]) -> String {
    serde_json::to_string(taints).unwrap_or_else(|_| "[]".to_string())
}

/// Frequency of every `label=value` pair across `candidates`.
pub fn label_pool<T: Targetable>(candidates: &[&T]) -> BTreeMap<(String, String), usize> {
    let mut pool = BTreeMap::new();
    for candidate in candidates {
        for (key, value) in candidate.labels() {
            *pool.entry((key.clone(), value.clone())).or_insert(0) += 1;
        }
    }
    pool
}

/// Select targets with default options. `None` when `candidates` is empty.
pub fn select_targets<'a, T: Targetable>(
    candidates: &[&'a T],
    rng: &mut ScenarioRng,
) -> Option<Selection<'a, T>> {
    select_targets_with(candidates, rng, TargetingOptions::default())
}

/// Select targets by identity or by a sampled label pair.
pub fn select_targets_with<'a, T: Targetable>(
    candidates: &[&'a T],
    rng: &mut ScenarioRng,
    options: TargetingOptions,
) -> Option<Selection<'a, T>> {
    if candidates.is_empty() {
        return None;
    }

    let pool = label_pool(candidates);
    log::debug!(
        "{} distinct label pairs across {} candidates",
        pool.len(),
        candidates.len()
    );

    let by_identity = rng.random() < options.identity_probability || pool.is_empty();
    if by_identity {
        return Some(select_by_identity(candidates, rng, options.max_identity));
    }

    let pairs: Vec<&(String, String)> = pool.keys().collect();
    let (key, value) = pairs[rng.index(pairs.len())];
    Some(select_by_label(candidates, key, value, rng))
}

/// Target between 1 and `max` candidates by name.
pub fn select_by_identity<'a, T: Targetable>(
    candidates: &[&'a T],
    rng: &mut ScenarioRng,
    max: usize,
) -> Selection<'a, T> {
    let upper = max.clamp(1, candidates.len().max(1));
    let count = rng.randint_inclusive(1, upper as i64) as usize;
    let matched: Vec<&'a T> = rng.sample(candidates, count).into_iter().copied().collect();

    log::debug!(
        "identity targeting: {}",
        matched.iter().map(|c| c.name()).collect::<Vec<_>>().join(",")
    );

    Selection {
        selector: TargetSelector::Identity {
            key: T::IDENTITY_KEY.map(str::to_string),
            names: matched.iter().map(|c| c.name().to_string()).collect(),
        },
        count: matched.len(),
        match_count: matched.len(),
        taints: collect_taints(&matched),
        matched,
    }
}

/// Target a random number of the candidates carrying `key=value`.
pub fn select_by_label<'a, T: Targetable>(
    candidates: &[&'a T],
    key: &str,
    value: &str,
    rng: &mut ScenarioRng,
) -> Selection<'a, T> {
    let matching: Vec<&'a T> = candidates
        .iter()
        .copied()
        .filter(|c| c.labels().get(key).is_some_and(|v| v == value))
        .collect();

    let count = rng.randint_inclusive(1, matching.len().max(1) as i64) as usize;
    let matched: Vec<&'a T> = rng.sample(&matching, count).into_iter().copied().collect();

    log::debug!(
        "label targeting {key}={value}: {} matching, selecting {}",
        matching.len(),
        matched.len()
    );

    Selection {
        selector: TargetSelector::Label {
            key: key.to_string(),
            value: value.to_string(),
        },
        count: matched.len(),
        match_count: matching.len(),
        taints: collect_taints(&matched),
        matched,
    }
}

/// Union of taints in first-seen order, compared by full content.
fn collect_taints<T: Targetable>(resources: &[&T]) -> Vec<Taint> {
    let mut seen = BTreeSet::new();
    let mut taints = Vec::new();
    for resource in resources {
        for taint in resource.taints() {
            if seen.insert(taint) {
                taints.push(taint.clone());
            }
        }
    }
    taints
}
