use ndarray::Array2;

use crate::{MergeError, Result};

/// A trained low-rank adapter for one task.
///
/// The dense update it represents is `scaling * up * down`, with
/// `down` of shape `(rank, in_dim)` and `up` of shape `(out_dim, rank)`.
#[derive(Debug, Clone)]
pub struct LoraAdapter {
    /// Task label (the country this adapter was trained on).
    pub task: String,
    pub down: Array2<f32>,
    pub up: Array2<f32>,
    pub alpha: f32,
}

impl LoraAdapter {
    /// Creates an adapter, checking that `up` and `down` agree on rank.
    ///
    /// # Errors
    /// Returns `MergeError::ShapeMismatch` if `up.ncols() != down.nrows()`.
    pub fn new(
        task: impl Into<String>,
        down: Array2<f32>,
        up: Array2<f32>,
        alpha: f32,
    ) -> Result<Self> {
        if up.ncols() != down.nrows() {
            return Err(MergeError::ShapeMismatch {
                what: "adapter rank",
                got: (up.nrows(), up.ncols()),
                expected: (up.nrows(), down.nrows()),
            });
        }
        Ok(Self {
            task: task.into(),
            down,
            up,
            alpha,
        })
    }

    pub fn rank(&self) -> usize {
        self.down.nrows()
    }

    pub fn in_dim(&self) -> usize {
        self.down.ncols()
    }

    pub fn out_dim(&self) -> usize {
        self.up.nrows()
    }

    /// LoRA scaling factor `alpha / rank`.
    pub fn scaling(&self) -> f32 {
        self.alpha / self.rank() as f32
    }

    /// Materialises the dense `(out_dim, in_dim)` update.
    pub fn delta(&self) -> Array2<f32> {
        let mut delta = self.up.dot(&self.down);
        delta *= self.scaling();
        delta
    }
}

/// The dense update produced by merging an adapter library.
#[derive(Debug, Clone)]
pub struct MergedDelta {
    /// Strategy and step this delta came from, e.g. `"LoRASoups/3"`.
    pub name: String,
    pub delta: Array2<f32>,
}

/// Checks that every adapter shares the same outer dimensions.
///
/// # Errors
/// Returns `MergeError::NoAdapters` for an empty library and
/// `MergeError::ShapeMismatch` on disagreement.
pub(crate) fn common_dims(adapters: &[LoraAdapter]) -> Result<(usize, usize)> {
    let first = adapters.first().ok_or(MergeError::NoAdapters)?;
    let dims = (first.out_dim(), first.in_dim());

    for adapter in &adapters[1..] {
        let got = (adapter.out_dim(), adapter.in_dim());
        if got != dims {
            return Err(MergeError::ShapeMismatch {
                what: "adapter delta",
                got,
                expected: dims,
            });
        }
    }

    Ok(dims)
}
