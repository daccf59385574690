//! Header and skip-row inference pipeline.
//!
//! Data flows strictly downward: sampling, row profiling, candidate ranking,
//! hierarchy analysis, shape classification, parameter synthesis and
//! validation. [`orchestrator::Inferencer`] wires the stages together.

pub mod cache;
pub mod candidate;
pub mod hierarchy;
pub mod orchestrator;
pub mod params;
pub mod pattern;
pub mod profile;
pub mod shape;
pub mod validation;
