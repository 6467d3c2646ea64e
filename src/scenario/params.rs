//! Parameter model for scenario genomes.
//!
//! Variants keep their state in typed fields and expose it through
//! [`Parameter`] views that pair each runner-facing name with its current
//! value and declared domain. Inventory-independent knobs carry their own
//! randomization rule ([`IntParam`], [`ChoiceParam`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rng::ScenarioRng;

/// Value of one runner-facing parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::List(v) => write!(f, "{}", v.join(",")),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// Declared value domain of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    OneOf(&'static [&'static str]),
    /// Any text, including empty.
    Text,
    NonEmpty,
    /// Structured text that parses as JSON.
    Json,
    Bool,
    /// Comma-separated port numbers.
    Ports { allow_empty: bool },
    List { min_len: usize },
}

/// One named field of a genome's active view.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub value: ParamValue,
    pub domain: Domain,
}

impl Parameter {
    pub fn new(name: &'static str, value: impl Into<ParamValue>, domain: Domain) -> Self {
        Self {
            name,
            value: value.into(),
            domain,
        }
    }

    /// Whether the current value lies within the declared domain.
    pub fn is_valid(&self) -> bool {
        match (&self.domain, &self.value) {
            (Domain::IntRange { min, max }, ParamValue::Int(v)) => (*min..=*max).contains(v),
            (Domain::FloatRange { min, max }, ParamValue::Float(v)) => {
                v.is_finite() && *v >= *min && *v <= *max
            }
            (Domain::OneOf(options), ParamValue::Text(v)) => options.contains(&v.as_str()),
            (Domain::Text, ParamValue::Text(_)) => true,
            (Domain::NonEmpty, ParamValue::Text(v)) => !v.trim().is_empty(),
            (Domain::Json, ParamValue::Text(v)) => {
                serde_json::from_str::<serde_json::Value>(v).is_ok()
            }
            (Domain::Bool, ParamValue::Bool(_)) => true,
            (Domain::Ports { allow_empty }, ParamValue::Text(v)) => {
                if v.is_empty() {
                    *allow_empty
                } else {
                    v.split(',').all(|p| p.trim().parse::<u16>().is_ok_and(|n| n > 0))
                }
            }
            (Domain::List { min_len }, ParamValue::List(v)) => v.len() >= *min_len,
            _ => false,
        }
    }
}

/// Integer knob with a uniform randomization rule over its domain.
#[derive(Debug, Clone, Copy)]
pub struct IntParam {
    pub name: &'static str,
    pub min: i64,
    pub max: i64,
}

impl IntParam {
    pub const fn new(name: &'static str, min: i64, max: i64) -> Self {
        Self { name, min, max }
    }

    pub fn randomize(&self, rng: &mut ScenarioRng) -> i64 {
        rng.randint_inclusive(self.min, self.max)
    }

    pub fn bind(&self, value: i64) -> Parameter {
        Parameter::new(
            self.name,
            value,
            Domain::IntRange {
                min: self.min,
                max: self.max,
            },
        )
    }
}

/// Text knob drawn from a fixed option list.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceParam {
    pub name: &'static str,
    pub options: &'static [&'static str],
}

impl ChoiceParam {
    pub const fn new(name: &'static str, options: &'static [&'static str]) -> Self {
        Self { name, options }
    }

    pub fn randomize(&self, rng: &mut ScenarioRng) -> String {
        rng.choice(self.options)
            .copied()
            .unwrap_or_default()
            .to_string()
    }

    pub fn bind(&self, value: &str) -> Parameter {
        Parameter::new(self.name, value, Domain::OneOf(self.options))
    }
}

pub const CHAOS_DURATION: IntParam = IntParam::new("TOTAL_CHAOS_DURATION", 30, 600);

pub const HOG_IMAGE: &str = "quay.io/krkn-chaos/krkn-hog";
pub const NETWORK_CHAOS_IMAGE: &str = "quay.io/krkn-chaos/krkn-network-chaos:latest";
pub const SERVICE_HIJACKING_IMAGE: &str = "quay.io/krkn-chaos/krkn-service-hijacking:v0.1.3";
pub const POD_NETWORK_IMAGE: &str = "quay.io/krkn-chaos/krkn:tools";

/// Take `theirs` with even odds, otherwise keep `mine`.
pub(crate) fn inherit<T: Clone>(rng: &mut ScenarioRng, mine: &T, theirs: &T) -> T {
    if rng.chance(0.5) {
        theirs.clone()
    } else {
        mine.clone()
    }
}

/// Render ports as a comma-separated list.
pub(crate) fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
