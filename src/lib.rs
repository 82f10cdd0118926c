//! Prioritized, hierarchically subdividing terrain generation.
//!
//! See [`GenerationQueue`] for the scheduler itself. [`Config`] loads its settings from a RON file.

mod config;

pub use config::Config;

pub use strata_gen::*;
