//! Schema module - configuration, cluster inventory and result types.

mod config;
mod inventory;
mod results;

pub use config::*;
pub use inventory::*;
pub use results::*;
