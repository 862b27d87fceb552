use std::{fmt, io, path::PathBuf};

use merging::MergeError;

/// The result type used across the continual crate.
pub type Result<T> = std::result::Result<T, RunError>;

/// Failures while preparing or running an experiment.
#[derive(Debug)]
pub enum RunError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    /// A metadata CSV line did not parse.
    Metadata {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// No patches matched a country/split filter.
    NoPatches {
        country: String,
        split: &'static str,
    },
    /// Fewer patches matched than were requested.
    NotEnoughPatches {
        country: String,
        split: &'static str,
        requested: usize,
        available: usize,
    },
    /// The permutation referenced a country index out of range.
    BadTaskIndex {
        index: usize,
        countries: usize,
    },
    Merge(MergeError),
    /// The rayon thread pool for `num_workers` could not be built.
    Threads(String),
    /// A safetensors checkpoint failed to encode or decode.
    Checkpoint {
        path: PathBuf,
        reason: String,
    },
    /// The report could not be serialised.
    Report(serde_json::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error on '{}': {source}", path.display()),
            Self::Metadata { path, line, reason } => {
                write!(f, "metadata '{}' line {line}: {reason}", path.display())
            }
            Self::NoPatches { country, split } => {
                write!(f, "no {split} patches found for country '{country}'")
            }
            Self::NotEnoughPatches {
                country,
                split,
                requested,
                available,
            } => write!(
                f,
                "requested {requested} samples but only {available} {split} patches \
                 available for '{country}'"
            ),
            Self::BadTaskIndex { index, countries } => {
                write!(f, "task index {index} is out of range for {countries} countries")
            }
            Self::Merge(e) => write!(f, "merge failed: {e}"),
            Self::Threads(msg) => write!(f, "cannot build worker pool: {msg}"),
            Self::Checkpoint { path, reason } => {
                write!(f, "checkpoint '{}': {reason}", path.display())
            }
            Self::Report(e) => write!(f, "cannot serialise report: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Merge(e) => Some(e),
            Self::Report(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MergeError> for RunError {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}

impl From<serde_json::Error> for RunError {
    fn from(e: serde_json::Error) -> Self {
        Self::Report(e)
    }
}
