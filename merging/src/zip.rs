use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::adapter::common_dims;
use crate::{LoraAdapter, MergedDelta, Result};

/// ZipLoRA configuration.
///
/// Each adapter gets one merger coefficient per input column. The
/// coefficients are fit by gradient descent on two terms: keeping each
/// scaled delta close to its original, and de-correlating the scaled
/// columns of different adapters (the "zip" objective).
#[derive(Debug, Clone)]
pub struct ZipConfig {
    /// Gradient descent iterations.
    pub iters: usize,
    /// Gradient descent step size.
    pub lr: f32,
    /// Weight of the pairwise alignment penalty.
    pub alignment_weight: f32,
    pub seed: u64,
}

impl Default for ZipConfig {
    fn default() -> Self {
        Self {
            iters: 100,
            lr: 0.05,
            alignment_weight: 0.01,
            seed: 0,
        }
    }
}

/// ZipLoRA merger.
#[derive(Debug)]
pub struct ZipMerger {
    config: ZipConfig,
}

impl ZipMerger {
    pub fn new(config: ZipConfig) -> Self {
        Self { config }
    }

    /// Merges the adapter library with per-column coefficients.
    ///
    /// Deterministic for a fixed config: coefficients start at 1 plus
    /// seeded noise and follow a fixed number of gradient steps.
    ///
    /// # Errors
    /// Returns a `MergeError` on an empty library or shape disagreement.
    pub fn merge(&self, adapters: &[LoraAdapter]) -> Result<MergedDelta> {
        let (out_dim, in_dim) = common_dims(adapters)?;
        let n = adapters.len();

        let deltas: Vec<Array2<f32>> = adapters.par_iter().map(LoraAdapter::delta).collect();

        // Per-adapter squared column norms and pairwise column dot
        // products; the objective decomposes per column over these.
        let norms: Vec<Vec<f32>> = deltas
            .iter()
            .map(|d| {
                d.axis_iter(Axis(1))
                    .map(|col| col.iter().map(|x| x * x).sum())
                    .collect()
            })
            .collect();

        let mut dots = vec![vec![vec![0.0f32; in_dim]; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                for c in 0..in_dim {
                    let dot = deltas[i]
                        .column(c)
                        .iter()
                        .zip(deltas[j].column(c))
                        .map(|(a, b)| a * b)
                        .sum();
                    dots[i][j][c] = dot;
                    dots[j][i][c] = dot;
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut coeffs = vec![vec![0.0f32; in_dim]; n];
        for row in &mut coeffs {
            for m in row.iter_mut() {
                *m = 1.0 + rng.random_range(-0.01..0.01);
            }
        }

        let lambda = self.config.alignment_weight;
        let mut grads = vec![0.0f32; n];
        for _ in 0..self.config.iters {
            for c in 0..in_dim {
                for i in 0..n {
                    let m_i = coeffs[i][c];
                    let mut g = 2.0 * (m_i - 1.0) * norms[i][c];
                    for j in 0..n {
                        if j == i {
                            continue;
                        }
                        let m_j = coeffs[j][c];
                        let term = m_i * m_j * dots[i][j][c];
                        if term != 0.0 {
                            g += lambda * term.signum() * m_j * dots[i][j][c];
                        }
                    }
                    grads[i] = g;
                }
                for i in 0..n {
                    coeffs[i][c] -= self.config.lr * grads[i] / norms[i][c].max(1e-8);
                }
            }
        }

        let mut merged = Array2::<f32>::zeros((out_dim, in_dim));
        for (delta, row) in deltas.iter().zip(&coeffs) {
            for c in 0..in_dim {
                let m = row[c];
                merged
                    .column_mut(c)
                    .iter_mut()
                    .zip(delta.column(c))
                    .for_each(|(out, x)| *out += m * x);
            }
        }

        log::debug!("ZipLoRA merged {n} adapter(s) over {in_dim} columns");

        Ok(MergedDelta {
            name: format!("ZipLoRA/{n}"),
            delta: merged,
        })
    }
}
