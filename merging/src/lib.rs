//! LoRA adapter merging strategies.
//!
//! Each completed task contributes a trained low-rank adapter; the
//! strategies here fold a library of adapters into a single dense
//! delta over the shared frozen base:
//! - **LoRASoups** — weighted averaging of adapter deltas.
//! - **ZipLoRA** — per-column merger coefficients found by seeded
//!   gradient descent, trading fidelity to each adapter against
//!   column-wise alignment between them.
//! - **LoRAHub** — derivative-free search over simplex mixing
//!   coefficients against a caller-supplied few-shot objective.

mod adapter;
mod error;
mod hub;
mod soups;
mod strategy;
mod zip;

pub use adapter::{LoraAdapter, MergedDelta};
pub use error::{MergeError, Result};
pub use hub::{HubConfig, HubMerger};
pub use soups::{SoupsConfig, SoupsMerger};
pub use strategy::MergeStrategy;
pub use zip::{ZipConfig, ZipMerger};
