use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::adapter::common_dims;
use crate::{LoraAdapter, MergeError, MergedDelta, Result};

/// LoRAHub configuration: derivative-free search over simplex mixing
/// coefficients.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Candidates evaluated per generation.
    pub population: usize,
    pub generations: usize,
    /// Std dev of the gaussian perturbation applied to the incumbent.
    pub sigma: f32,
    pub seed: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            population: 16,
            generations: 30,
            sigma: 0.15,
            seed: 0,
        }
    }
}

/// LoRAHub merger.
///
/// Keeps an incumbent coefficient vector on the simplex and, each
/// generation, evaluates seeded gaussian perturbations of it against
/// the few-shot objective, keeping the best candidate (elitist).
#[derive(Debug)]
pub struct HubMerger {
    config: HubConfig,
}

impl HubMerger {
    pub fn new(config: HubConfig) -> Self {
        Self { config }
    }

    /// Merges the adapter library, minimising `objective` over the
    /// merged delta. The objective is typically the loss of the merged
    /// model on a few-shot set from the current task.
    ///
    /// # Errors
    /// Returns a `MergeError` on an empty library, shape disagreement,
    /// or an objective that is non-finite for every candidate.
    pub fn merge<F>(&self, adapters: &[LoraAdapter], objective: F) -> Result<MergedDelta>
    where
        F: Fn(&Array2<f32>) -> f32 + Sync,
    {
        let (out_dim, in_dim) = common_dims(adapters)?;
        let n = adapters.len();

        let deltas: Vec<Array2<f32>> = adapters.par_iter().map(LoraAdapter::delta).collect();

        let mix = |coeffs: &[f32]| -> Array2<f32> {
            let mut merged = Array2::<f32>::zeros((out_dim, in_dim));
            for (delta, &w) in deltas.iter().zip(coeffs) {
                merged.scaled_add(w, delta);
            }
            merged
        };

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best = vec![1.0 / n as f32; n];
        let mut best_loss = objective(&mix(&best));
        if !best_loss.is_finite() {
            best_loss = f32::INFINITY;
        }

        for generation in 0..self.config.generations {
            let candidates: Vec<Vec<f32>> = (0..self.config.population)
                .map(|_| {
                    let mut coeffs = best.clone();
                    for w in &mut coeffs {
                        let noise: f32 = rng.sample(StandardNormal);
                        *w = (*w + self.config.sigma * noise).max(0.0);
                    }
                    project_to_simplex(&mut coeffs);
                    coeffs
                })
                .collect();

            let losses: Vec<f32> = candidates
                .par_iter()
                .map(|coeffs| objective(&mix(coeffs)))
                .collect();

            for (coeffs, loss) in candidates.into_iter().zip(losses) {
                if loss.is_finite() && loss < best_loss {
                    best_loss = loss;
                    best = coeffs;
                }
            }

            log::trace!("LoRAHub generation {generation}: best loss {best_loss}");
        }

        if !best_loss.is_finite() {
            return Err(MergeError::Search(
                "objective was non-finite for every candidate".into(),
            ));
        }

        log::debug!("LoRAHub merged {n} adapter(s), best loss {best_loss}");

        Ok(MergedDelta {
            name: format!("LoRAHub/{n}"),
            delta: mix(&best),
        })
    }
}

/// Clamps to non-negative and renormalises to sum 1; an all-zero
/// vector falls back to uniform.
fn project_to_simplex(coeffs: &mut [f32]) {
    let sum: f32 = coeffs.iter().sum();
    if sum > 0.0 {
        for w in coeffs.iter_mut() {
            *w /= sum;
        }
    } else {
        let uniform = 1.0 / coeffs.len() as f32;
        coeffs.fill(uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn adapter(task: &str, value: f32) -> LoraAdapter {
        let down = array![[value, value]];
        let up = array![[1.0], [1.0]];
        LoraAdapter::new(task, down, up, 1.0).unwrap()
    }

    #[test]
    fn search_approaches_target_mixture() {
        // Target delta is exactly adapter "b"'s delta; the search
        // should put most weight on it.
        let a = adapter("a", 0.0);
        let b = adapter("b", 2.0);
        let target = b.delta();

        let merger = HubMerger::new(HubConfig::default());
        let merged = merger
            .merge(&[a, b], |delta| {
                (delta - &target).iter().map(|x| x * x).sum()
            })
            .unwrap();

        let err: f32 = (&merged.delta - &target).iter().map(|x| x * x).sum();
        assert!(err < 0.05, "residual {err}");
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let a = adapter("a", 1.0);
        let b = adapter("b", -1.0);
        let merger = HubMerger::new(HubConfig::default());
        let obj = |delta: &Array2<f32>| delta.iter().map(|x| x * x).sum::<f32>();

        let first = merger.merge(&[a.clone(), b.clone()], obj).unwrap();
        let second = merger.merge(&[a, b], obj).unwrap();
        assert_eq!(first.delta, second.delta);
    }

    #[test]
    fn single_adapter_merges_to_own_delta() {
        let a = adapter("a", 1.5);
        let merger = HubMerger::new(HubConfig::default());
        let merged = merger
            .merge(std::slice::from_ref(&a), |_| 0.0)
            .unwrap();
        assert_eq!(merged.delta, a.delta());
    }

    #[test]
    fn non_finite_objective_is_an_error() {
        let a = adapter("a", 1.0);
        let b = adapter("b", 2.0);
        let merger = HubMerger::new(HubConfig::default());
        assert!(matches!(
            merger.merge(&[a, b], |_| f32::NAN),
            Err(MergeError::Search(_))
        ));
    }
}
