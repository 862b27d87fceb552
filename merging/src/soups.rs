use ndarray::Array2;
use rayon::prelude::*;

use crate::adapter::common_dims;
use crate::{LoraAdapter, MergeError, MergedDelta, Result};

/// LoRASoups configuration: weighted averaging of adapter deltas.
#[derive(Debug, Clone)]
pub struct SoupsConfig {
    /// Mixing weights, one per adapter. `None` means uniform.
    pub weights: Option<Vec<f32>>,
}

impl Default for SoupsConfig {
    fn default() -> Self {
        Self { weights: None }
    }
}

impl SoupsConfig {
    /// Resolves the mixing weights for `n` adapters, normalised to sum 1.
    ///
    /// # Errors
    /// Returns `MergeError::InvalidWeights` on wrong count, negative
    /// entries or an all-zero vector.
    pub fn normalized_weights(&self, n: usize) -> Result<Vec<f32>> {
        let Some(weights) = &self.weights else {
            return Ok(vec![1.0 / n as f32; n]);
        };

        if weights.len() != n {
            return Err(MergeError::InvalidWeights(format!(
                "expected {n} weights, got {}",
                weights.len()
            )));
        }
        if weights.iter().any(|&w| w < 0.0 || !w.is_finite()) {
            return Err(MergeError::InvalidWeights(
                "weights must be finite and non-negative".into(),
            ));
        }

        let sum: f32 = weights.iter().sum();
        if sum == 0.0 {
            return Err(MergeError::InvalidWeights("weights sum to zero".into()));
        }

        Ok(weights.iter().map(|w| w / sum).collect())
    }
}

/// LoRASoups merger: the merged delta is the weighted average of the
/// adapters' dense deltas.
#[derive(Debug)]
pub struct SoupsMerger {
    config: SoupsConfig,
}

impl SoupsMerger {
    pub fn new(config: SoupsConfig) -> Self {
        Self { config }
    }

    /// Merges the adapter library.
    ///
    /// # Errors
    /// Returns a `MergeError` on an empty library, shape disagreement
    /// or unusable weights.
    pub fn merge(&self, adapters: &[LoraAdapter]) -> Result<MergedDelta> {
        let (out_dim, in_dim) = common_dims(adapters)?;
        let weights = self.config.normalized_weights(adapters.len())?;

        let deltas: Vec<Array2<f32>> = adapters.par_iter().map(LoraAdapter::delta).collect();

        let mut merged = Array2::<f32>::zeros((out_dim, in_dim));
        for (delta, &w) in deltas.iter().zip(&weights) {
            merged.scaled_add(w, delta);
        }

        log::debug!("LoRASoups merged {} adapter(s)", adapters.len());

        Ok(MergedDelta {
            name: format!("LoRASoups/{}", adapters.len()),
            delta: merged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn adapter(task: &str, value: f32) -> LoraAdapter {
        // rank 1, scaling 16/1, delta = 16 * value everywhere
        let down = array![[value, value]];
        let up = array![[1.0], [1.0]];
        LoraAdapter::new(task, down, up, 16.0).unwrap()
    }

    #[test]
    fn uniform_average_of_two() {
        let merger = SoupsMerger::new(SoupsConfig::default());
        let merged = merger
            .merge(&[adapter("a", 1.0), adapter("b", 3.0)])
            .unwrap();
        // mean of 16 and 48
        assert_eq!(merged.delta[[0, 0]], 32.0);
        assert_eq!(merged.delta[[1, 1]], 32.0);
    }

    #[test]
    fn explicit_weights_are_normalised() {
        let merger = SoupsMerger::new(SoupsConfig {
            weights: Some(vec![3.0, 1.0]),
        });
        let merged = merger
            .merge(&[adapter("a", 1.0), adapter("b", 3.0)])
            .unwrap();
        // 0.75 * 16 + 0.25 * 48
        assert_eq!(merged.delta[[0, 0]], 24.0);
    }

    #[test]
    fn single_adapter_is_identity() {
        let merger = SoupsMerger::new(SoupsConfig::default());
        let a = adapter("a", 2.0);
        let merged = merger.merge(std::slice::from_ref(&a)).unwrap();
        assert_eq!(merged.delta, a.delta());
    }

    #[test]
    fn rejects_bad_weights() {
        let merger = SoupsMerger::new(SoupsConfig {
            weights: Some(vec![1.0]),
        });
        assert!(matches!(
            merger.merge(&[adapter("a", 1.0), adapter("b", 1.0)]),
            Err(MergeError::InvalidWeights(_))
        ));

        let merger = SoupsMerger::new(SoupsConfig {
            weights: Some(vec![0.0, 0.0]),
        });
        assert!(merger.merge(&[adapter("a", 1.0), adapter("b", 1.0)]).is_err());
    }
}
