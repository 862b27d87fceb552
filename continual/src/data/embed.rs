use config::Backbone;
use ndarray::Array1;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

/// BigEarthNet-19 label slots.
pub const NUM_CLASSES: usize = 19;

/// Deterministic synthetic backbone embedding for a patch.
///
/// Real checkpoints are not loaded; the feature vector is a
/// standard-normal draw from an RNG seeded by the experiment seed, the
/// backbone's salt and a hash of the patch id, so the same patch maps
/// to the same point of the same feature space on every run and
/// platform.
pub fn embed(backbone: Backbone, experiment_seed: u64, patch_id: &str) -> Array1<f32> {
    let seed = mix(experiment_seed, backbone.seed_salt(), fnv1a(patch_id.as_bytes()));
    let mut rng = StdRng::seed_from_u64(seed);
    Array1::from_shape_fn(backbone.embed_dim(), |_| rng.sample(StandardNormal))
}

fn mix(seed: u64, salt: u64, hash: u64) -> u64 {
    seed.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(salt)
        .rotate_left(17)
        ^ hash
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
