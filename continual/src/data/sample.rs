use rand::rngs::StdRng;
use rand::seq::index;

use crate::{Result, RunError};

use super::{MetadataTable, PatchRecord, Split};

/// Fraction of sampled train patches kept for training; the rest form
/// the internal validation split.
pub const TRAIN_FRAC: f64 = 0.8;

/// Samples `n` patches of `country`/`split` without replacement.
///
/// Snowy and cloudy patches are filtered out unless included, matching
/// the dataset's snow/cloud metadata flags.
///
/// # Errors
/// Returns `RunError::NoPatches` if nothing matches the filter and
/// `RunError::NotEnoughPatches` if fewer than `n` patches remain.
pub fn sample_country(
    table: &MetadataTable,
    country: &str,
    split: Split,
    n: usize,
    include_snowy: bool,
    include_cloudy: bool,
    rng: &mut StdRng,
) -> Result<Vec<PatchRecord>> {
    let pool: Vec<&PatchRecord> = table
        .records()
        .iter()
        .filter(|r| r.country == country && r.split == split)
        .filter(|r| (include_snowy || !r.snowy) && (include_cloudy || !r.cloudy))
        .collect();

    if pool.is_empty() {
        return Err(RunError::NoPatches {
            country: country.to_string(),
            split: split.as_str(),
        });
    }
    if n > pool.len() {
        return Err(RunError::NotEnoughPatches {
            country: country.to_string(),
            split: split.as_str(),
            requested: n,
            available: pool.len(),
        });
    }

    let picked = index::sample(rng, pool.len(), n);
    Ok(picked.iter().map(|i| pool[i].clone()).collect())
}

/// Splits sampled train patches into (train, val) at `TRAIN_FRAC`,
/// in sampled order.
pub fn train_val_split(samples: Vec<PatchRecord>, train_frac: f64) -> (Vec<PatchRecord>, Vec<PatchRecord>) {
    let split_at = (samples.len() as f64 * train_frac) as usize;
    let mut train = samples;
    let val = train.split_off(split_at);
    (train, val)
}
