//! Resource scoping and target selection.
//!
//! - `pattern`: name expressions with inclusion/exclusion terms
//! - `targeting`: identity or label-based target sampling over inventory items

mod pattern;
mod targeting;

pub use pattern::{PatternError, PatternMatcher};
pub use targeting::{
    Selection, TargetSelector, Targetable, TargetingOptions, label_pool, select_by_identity,
    select_by_label, select_targets, select_targets_with, taints_json,
};
