//! Run context management.
//!
//! This module provides:
//! - `RunContext`: the immutable per-run bundle of period, locations and connections
//! - `RunContextTemplate`: period-independent templates bound into a `RunContext`

mod run;
mod template;

pub use run::RunContext;
pub(crate) use template::placeholder_pattern;
pub use template::{RunContextTemplate, PLACEHOLDERS};
