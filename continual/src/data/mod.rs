//! Patch metadata, seeded sampling and deterministic backbone
//! embeddings.

mod embed;
mod metadata;
mod sample;

pub use embed::{embed, NUM_CLASSES};
pub use metadata::{MetadataTable, PatchRecord, Split};
pub use sample::{sample_country, train_val_split, TRAIN_FRAC};
