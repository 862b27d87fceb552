use std::{fmt, io, path::PathBuf};

/// All errors produced while loading or validating a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// The document is not valid YAML or does not match the schema.
    Parse(serde_yaml::Error),
    /// The document parsed but violates an invariant.
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config '{}': {source}", path.display())
            }
            Self::Parse(e) => write!(f, "invalid config document: {e}"),
            Self::Invalid { field, reason } => write!(f, "invalid config: {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}
