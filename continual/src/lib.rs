//! Continual-learning experiment pipeline.
//!
//! Visits per-country tasks in the configured permutation order, trains
//! a LoRA probe per task over deterministic backbone embeddings, keeps
//! a replay buffer of past patches, merges the adapter library after
//! every task and evaluates the merged model on all countries seen so
//! far.

pub mod checkpoint;
pub mod data;
pub mod replay;
pub mod report;
pub mod schedule;

mod error;
mod probe;
mod runner;

pub use error::{Result, RunError};
pub use probe::{Example, LoraProbe, bce_loss, micro_accuracy, seeded_base, LORA_ALPHA, LORA_RANK};
pub use runner::Experiment;
