use merging::LoraAdapter;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

/// LoRA rank used by every per-task adapter.
pub const LORA_RANK: usize = 4;
/// LoRA alpha; effective scaling is `alpha / rank`.
pub const LORA_ALPHA: f32 = 16.0;

/// One supervised example: backbone features and multi-label target.
#[derive(Debug, Clone)]
pub struct Example {
    pub x: Array1<f32>,
    /// 0/1 per label slot.
    pub y: Array1<f32>,
}

/// Seeded frozen base weight, shared by every task's probe.
///
/// Normal init scaled by `1/sqrt(in_dim)` so logits start near zero.
pub fn seeded_base(out_dim: usize, in_dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let scale = 1.0 / (in_dim as f32).sqrt();
    Array2::from_shape_fn((out_dim, in_dim), |_| {
        let v: f32 = rng.sample(StandardNormal);
        v * scale
    })
}

/// A LoRA-adapted linear probe over frozen backbone features.
///
/// The base weight is frozen; only the low-rank `down`/`up` pair is
/// trained. `down` gets a seeded normal init scaled by `1/sqrt(rank)`,
/// `up` starts at zero so the probe begins exactly at the base.
#[derive(Debug, Clone)]
pub struct LoraProbe {
    base: Array2<f32>,
    down: Array2<f32>,
    up: Array2<f32>,
    alpha: f32,
}

impl LoraProbe {
    pub fn new(base: Array2<f32>, rank: usize, alpha: f32, adapter_seed: u64) -> Self {
        let (out_dim, in_dim) = base.dim();
        let mut rng = StdRng::seed_from_u64(adapter_seed);
        let scale = 1.0 / (rank as f32).sqrt();
        let down = Array2::from_shape_fn((rank, in_dim), |_| {
            let v: f32 = rng.sample(StandardNormal);
            v * scale
        });
        let up = Array2::zeros((out_dim, rank));

        Self {
            base,
            down,
            up,
            alpha,
        }
    }

    pub fn scaling(&self) -> f32 {
        self.alpha / self.down.nrows() as f32
    }

    /// Dense weight the probe currently realises: `base + scaling*up*down`.
    pub fn effective_weight(&self) -> Array2<f32> {
        let mut w = self.up.dot(&self.down);
        w *= self.scaling();
        w += &self.base;
        w
    }

    /// Minibatch SGD on BCE-with-logits over the 19 label slots.
    ///
    /// Minibatch order is reshuffled every epoch from `shuffle_seed`.
    /// Per-step losses are logged when `log_every_step`; per-epoch
    /// train/val metrics are always logged at debug level.
    pub fn train(
        &mut self,
        train: &[Example],
        val: &[Example],
        epochs: usize,
        batch_size: usize,
        lr: f32,
        shuffle_seed: u64,
        log_every_step: bool,
    ) -> f32 {
        let mut rng = StdRng::seed_from_u64(shuffle_seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let scaling = self.scaling();
        let mut last_loss = f32::NAN;

        for epoch in 0..epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            let mut steps = 0;

            for (step, batch) in order.chunks(batch_size).enumerate() {
                let w = self.effective_weight();
                let b = batch.len();
                let denom = (b * w.nrows()) as f32;

                // dL/dW accumulated over the batch.
                let mut grad_w = Array2::<f32>::zeros(w.dim());
                let mut loss = 0.0;

                for &idx in batch {
                    let example = &train[idx];
                    let z = w.dot(&example.x);
                    for (k, (&zk, &yk)) in z.iter().zip(example.y.iter()).enumerate() {
                        loss += zk.max(0.0) - zk * yk + (-zk.abs()).exp().ln_1p();
                        let g = (sigmoid(zk) - yk) / denom;
                        grad_w
                            .row_mut(k)
                            .iter_mut()
                            .zip(example.x.iter())
                            .for_each(|(gw, &xj)| *gw += g * xj);
                    }
                }
                loss /= denom;

                // Chain rule through the low-rank factorisation.
                let grad_up = grad_w.dot(&self.down.t());
                let grad_down = self.up.t().dot(&grad_w);
                self.up.scaled_add(-lr * scaling, &grad_up);
                self.down.scaled_add(-lr * scaling, &grad_down);

                epoch_loss += loss;
                steps += 1;
                if log_every_step {
                    log::info!("train step: epoch={epoch} step={step} loss={loss:.4}");
                }
            }

            last_loss = epoch_loss / steps.max(1) as f32;
            if val.is_empty() {
                log::debug!("epoch {epoch} done: train_loss={last_loss:.4}");
            } else {
                let w = self.effective_weight();
                let val_loss = bce_loss(&w, val);
                let val_acc = micro_accuracy(&w, val);
                log::debug!(
                    "epoch {epoch} done: train_loss={last_loss:.4} \
                     val_loss={val_loss:.4} val_acc={val_acc:.4}"
                );
            }
        }

        last_loss
    }

    /// Extracts the trained adapter for the merge layer.
    pub fn adapter(&self, task: impl Into<String>) -> LoraAdapter {
        LoraAdapter::new(task, self.down.clone(), self.up.clone(), self.alpha)
            .expect("probe factors agree on rank by construction")
    }

    pub fn base(&self) -> &Array2<f32> {
        &self.base
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Mean BCE-with-logits of `w` over `examples` (numerically stable).
pub fn bce_loss(w: &Array2<f32>, examples: &[Example]) -> f32 {
    if examples.is_empty() {
        return 0.0;
    }
    let mut loss = 0.0;
    for example in examples {
        let z = w.dot(&example.x);
        for (&zk, &yk) in z.iter().zip(example.y.iter()) {
            loss += zk.max(0.0) - zk * yk + (-zk.abs()).exp().ln_1p();
        }
    }
    loss / (examples.len() * w.nrows()) as f32
}

/// Fraction of label slots predicted correctly at threshold 0.5.
pub fn micro_accuracy(w: &Array2<f32>, examples: &[Example]) -> f32 {
    if examples.is_empty() {
        return 0.0;
    }
    let mut correct = 0usize;
    for example in examples {
        let z = w.dot(&example.x);
        for (&zk, &yk) in z.iter().zip(example.y.iter()) {
            let pred = sigmoid(zk) > 0.5;
            if pred == (yk > 0.5) {
                correct += 1;
            }
        }
    }
    correct as f32 / (examples.len() * w.nrows()) as f32
}
