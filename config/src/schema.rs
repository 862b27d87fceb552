use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Adapter merging strategy under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMethod {
    #[serde(rename = "ZipLoRA")]
    ZipLora,
    #[serde(rename = "LoRASoups")]
    LoraSoups,
    #[serde(rename = "LoRAHub")]
    LoraHub,
}

impl MergeMethod {
    /// The YAML spelling of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZipLora => "ZipLoRA",
            Self::LoraSoups => "LoRASoups",
            Self::LoraHub => "LoRAHub",
        }
    }
}

/// Remote-sensing foundation model backbone.
///
/// Both are ViT-B encoders; the backbone only determines the feature
/// space the per-task probes are trained in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backbone {
    #[serde(rename = "SpectralGPT")]
    SpectralGpt,
    #[serde(rename = "SoftCon")]
    SoftCon,
}

impl Backbone {
    /// Embedding dimension of the backbone's feature space.
    pub fn embed_dim(&self) -> usize {
        match self {
            Self::SpectralGpt => 768,
            Self::SoftCon => 768,
        }
    }

    /// Seed salt keeping the two feature spaces disjoint.
    pub fn seed_salt(&self) -> u64 {
        match self {
            Self::SpectralGpt => 0x5351_4754,
            Self::SoftCon => 0x534f_4654,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpectralGpt => "SpectralGPT",
            Self::SoftCon => "SoftCon",
        }
    }
}

/// Training and scheduling parameters for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Dataset partitions, one per country.
    pub countries: Vec<String>,
    /// Visiting order over country indices.
    pub permutation: Vec<usize>,
    /// Patches sampled from each country's train split.
    pub train_samples: usize,
    /// Patches sampled from each country's test split.
    pub test_samples: usize,
    /// Replay buffer capacity across tasks.
    pub memory_size: usize,
    /// Master reproducibility seed.
    pub seed: u64,
    pub batch_size: usize,
    /// Worker threads for merge/eval parallelism (0 = default).
    pub num_workers: usize,
    pub epoch: usize,
    pub lr: f64,
    /// Keep patches flagged as snowy.
    pub include_snowy: bool,
    /// Keep patches flagged as cloudy.
    pub include_cloudy: bool,
    /// Output directory for adapters, merged deltas and the report.
    pub save_dir: PathBuf,
    /// Log the loss of every optimisation step.
    pub log_every_step: bool,
}

/// The full experiment configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub test_type: MergeMethod,
    pub model_module: Backbone,
    pub params: Params,
}

impl ExperimentConfig {
    /// Parses a YAML document and validates it.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the document does not parse or any
    /// invariant is violated.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the file cannot be read, does not
    /// parse or any invariant is violated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Checks every invariant of the document.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.params;

        if p.countries.is_empty() {
            return invalid("countries", "must not be empty".into());
        }
        for (i, country) in p.countries.iter().enumerate() {
            if country.is_empty() {
                return invalid("countries", format!("entry {i} is empty"));
            }
        }
        for i in 1..p.countries.len() {
            if p.countries[..i].contains(&p.countries[i]) {
                return invalid("countries", format!("duplicate entry '{}'", p.countries[i]));
            }
        }

        Self::validate_permutation(&p.permutation, p.countries.len())?;

        if p.train_samples == 0 {
            return invalid("train_samples", "must be greater than zero".into());
        }
        if p.batch_size == 0 {
            return invalid("batch_size", "must be greater than zero".into());
        }
        if p.batch_size > p.train_samples {
            return invalid(
                "batch_size",
                format!(
                    "must not exceed train_samples ({} > {})",
                    p.batch_size, p.train_samples
                ),
            );
        }
        if p.epoch == 0 {
            return invalid("epoch", "must be greater than zero".into());
        }
        if !(p.lr.is_finite() && p.lr > 0.0) {
            return invalid("lr", format!("must be a positive finite number, got {}", p.lr));
        }
        if p.save_dir.as_os_str().is_empty() {
            return invalid("save_dir", "must not be empty".into());
        }

        Ok(())
    }

    /// A permutation must cover `0..len` with every index exactly once.
    fn validate_permutation(permutation: &[usize], len: usize) -> Result<(), ConfigError> {
        if permutation.len() != len {
            return invalid(
                "permutation",
                format!("expected {len} entries, got {}", permutation.len()),
            );
        }

        let mut seen = vec![false; len];
        for &idx in permutation {
            if idx >= len {
                return invalid(
                    "permutation",
                    format!("index {idx} is out of range for {len} countries"),
                );
            }
            if seen[idx] {
                return invalid("permutation", format!("index {idx} appears more than once"));
            }
            seen[idx] = true;
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid { field, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml() -> String {
        r#"
test_type: ZipLoRA
model_module: SoftCon
params:
  countries: [Ireland, Portugal, Finland]
  permutation: [2, 0, 1]
  train_samples: 1000
  test_samples: 200
  memory_size: 300
  seed: 123
  batch_size: 32
  num_workers: 4
  epoch: 25
  lr: 0.0001
  include_snowy: false
  include_cloudy: false
  save_dir: /tmp/out
  log_every_step: true
"#
        .to_string()
    }

    #[test]
    fn parses_full_document() {
        let config = ExperimentConfig::from_yaml_str(&base_yaml()).unwrap();
        assert_eq!(config.test_type, MergeMethod::ZipLora);
        assert_eq!(config.model_module, Backbone::SoftCon);
        assert_eq!(config.params.countries.len(), 3);
        assert_eq!(config.params.permutation, vec![2, 0, 1]);
        assert_eq!(config.params.seed, 123);
        assert!(config.params.log_every_step);
    }

    #[test]
    fn all_merge_methods_parse() {
        for (name, expected) in [
            ("ZipLoRA", MergeMethod::ZipLora),
            ("LoRASoups", MergeMethod::LoraSoups),
            ("LoRAHub", MergeMethod::LoraHub),
        ] {
            let yaml = base_yaml().replace("ZipLoRA", name);
            let config = ExperimentConfig::from_yaml_str(&yaml).unwrap();
            assert_eq!(config.test_type, expected);
            assert_eq!(config.test_type.as_str(), name);
        }
    }

    #[test]
    fn rejects_unknown_merge_method() {
        let yaml = base_yaml().replace("ZipLoRA", "TIES");
        assert!(matches!(
            ExperimentConfig::from_yaml_str(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unknown_backbone() {
        let yaml = base_yaml().replace("SoftCon", "ResNet50");
        assert!(matches!(
            ExperimentConfig::from_yaml_str(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unknown_field() {
        let yaml = base_yaml().replace("log_every_step: true", "log_every_step: true\n  bogus: 1");
        assert!(matches!(
            ExperimentConfig::from_yaml_str(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_short_permutation() {
        let yaml = base_yaml().replace("[2, 0, 1]", "[0, 1]");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "permutation", .. }
        ));
    }

    #[test]
    fn rejects_duplicate_permutation_index() {
        let yaml = base_yaml().replace("[2, 0, 1]", "[0, 1, 1]");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "permutation", .. }
        ));
    }

    #[test]
    fn rejects_out_of_range_permutation_index() {
        let yaml = base_yaml().replace("[2, 0, 1]", "[0, 1, 3]");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "permutation", .. }
        ));
    }

    #[test]
    fn rejects_duplicate_country() {
        let yaml = base_yaml().replace("Finland", "Ireland");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "countries", .. }
        ));
    }

    #[test]
    fn rejects_non_positive_lr() {
        let yaml = base_yaml().replace("lr: 0.0001", "lr: 0.0");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "lr", .. }));
    }

    #[test]
    fn rejects_zero_epoch() {
        let yaml = base_yaml().replace("epoch: 25", "epoch: 0");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "epoch", .. }));
    }

    #[test]
    fn rejects_batch_larger_than_train_samples() {
        let yaml = base_yaml().replace("batch_size: 32", "batch_size: 2000");
        let err = ExperimentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "batch_size", .. }
        ));
    }

    #[test]
    fn backbones_share_dim_but_not_feature_space() {
        assert_eq!(Backbone::SoftCon.embed_dim(), 768);
        assert_eq!(Backbone::SpectralGpt.embed_dim(), 768);
        assert_ne!(Backbone::SoftCon.seed_salt(), Backbone::SpectralGpt.seed_salt());
    }
}
