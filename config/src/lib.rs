//! Typed experiment configuration for continual LoRA-merging runs.
//!
//! The sole external interface of the experiment is a YAML document
//! selecting a merging strategy, a backbone family and the training
//! parameters for a permutation-ordered sequence of per-country tasks.
//! This crate parses that document and enforces its invariants before
//! any other part of the system sees it.

mod error;
mod schema;

pub use error::ConfigError;
pub use schema::{Backbone, ExperimentConfig, MergeMethod, Params};
