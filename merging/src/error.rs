use std::fmt;

/// The result type used across the merging crate.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Failures while merging adapter libraries.
#[derive(Debug)]
pub enum MergeError {
    /// No adapters were given to merge.
    NoAdapters,
    /// Adapter matrices do not agree on rank or outer dimensions.
    ShapeMismatch {
        what: &'static str,
        got: (usize, usize),
        expected: (usize, usize),
    },
    /// Mixing weights are unusable (wrong count, negative, all zero).
    InvalidWeights(String),
    /// The few-shot objective failed for every candidate.
    Search(String),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapters => write!(f, "no adapters to merge"),
            Self::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch in {what}: got {}x{}, expected {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            Self::InvalidWeights(msg) => write!(f, "invalid mixing weights: {msg}"),
            Self::Search(msg) => write!(f, "coefficient search failed: {msg}"),
        }
    }
}

impl std::error::Error for MergeError {}
