use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
    data::{clean::CleaningConfig, domain::IndexId},
    error::{ConfigError, IoError, StockcastResult},
    features::FeatureConfig,
    model::ModelKind,
    split::SplitConfig,
};

/// Complete, immutable description of one pipeline run.
///
/// Built with the `with_*` methods (or loaded from JSON) and checked once with
/// [`PipelineConfig::validate`] before any data is touched.
///
/// # Example
///
/// ```
/// # use stockcast::prelude::*;
/// let config = PipelineConfig::default()
///     .with_features(FeatureConfig::default().with_window(10).with_lags(5))
///     .with_models(vec![ModelKind::LogisticRegression, ModelKind::Knn])
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // ========================================================================
    // Data
    // ========================================================================
    /// Row cleaning and minimum history policy.
    cleaning: CleaningConfig,

    /// Indices to evaluate. `None` evaluates every index found in the input.
    indices: Option<BTreeSet<IndexId>>,

    // ========================================================================
    // Features & Splits
    // ========================================================================
    features: FeatureConfig,

    split: SplitConfig,

    // ========================================================================
    // Models
    // ========================================================================
    /// Model families to train, in report order.
    models: Vec<ModelKind>,

    /// Select hyperparameters on validation data when available.
    tune: bool,

    // ========================================================================
    // Runtime
    // ========================================================================
    /// Root of all randomness in the run.
    seed: u64,

    /// Worker threads. `None` uses the rayon default.
    threads: Option<usize>,

    /// Directory the report files are written to.
    output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cleaning: CleaningConfig::default(),
            indices: None,
            features: FeatureConfig::default(),
            split: SplitConfig::default(),
            models: ModelKind::iter().collect(),
            tune: true,
            seed: 42,
            threads: None,
            output_dir: PathBuf::from("reports"),
        }
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl PipelineConfig {
    pub fn with_cleaning(self, cleaning: CleaningConfig) -> Self {
        Self { cleaning, ..self }
    }

    /// Sets the minimum number of cleaned rows an index needs.
    pub fn with_min_rows(self, min_rows: usize) -> Self {
        Self {
            cleaning: CleaningConfig {
                min_rows,
                ..self.cleaning
            },
            ..self
        }
    }

    pub fn with_indices<I, T>(self, indices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<IndexId>,
    {
        Self {
            indices: Some(indices.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_features(self, features: FeatureConfig) -> Self {
        Self { features, ..self }
    }

    pub fn with_split(self, split: SplitConfig) -> Self {
        Self { split, ..self }
    }

    /// Sets the model families. Duplicates are removed, keeping the first occurrence.
    pub fn with_models(self, models: Vec<ModelKind>) -> Self {
        let mut seen = BTreeSet::new();
        let models = models.into_iter().filter(|m| seen.insert(*m)).collect();
        Self { models, ..self }
    }

    pub fn with_tune(self, tune: bool) -> Self {
        Self { tune, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    pub fn with_threads(self, threads: Option<usize>) -> Self {
        Self { threads, ..self }
    }

    pub fn with_output_dir(self, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..self
        }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl PipelineConfig {
    pub fn cleaning(&self) -> &CleaningConfig {
        &self.cleaning
    }

    pub fn indices(&self) -> Option<&BTreeSet<IndexId>> {
        self.indices.as_ref()
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn split(&self) -> &SplitConfig {
        &self.split
    }

    pub fn models(&self) -> &[ModelKind] {
        &self.models
    }

    pub fn tune(&self) -> bool {
        self.tune
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

// ================================================================================================
// Validation, Loading & Hashing
// ================================================================================================

impl PipelineConfig {
    /// Checks every parameter. Configuration errors are fatal.
    pub fn validate(&self) -> StockcastResult<()> {
        self.cleaning.validate()?;
        self.features.validate()?;
        self.split.validate()?;

        if self.models.is_empty() {
            return Err(ConfigError::NoModels.into());
        }
        if self.indices.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(ConfigError::InvalidParameter {
                name: "indices",
                msg: "an explicit index list must not be empty".to_string(),
            }
            .into());
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "threads",
                msg: "must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> StockcastResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> StockcastResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            IoError::ReadFailed(format!("config file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Computes a deterministic hash of this configuration.
    ///
    /// Stored in the run summary to tie reports to the configuration that produced them.
    pub fn hash(&self) -> StockcastResult<String> {
        let mut hasher = blake3::Hasher::new();
        let bytes = postcard::to_stdvec(self).map_err(ConfigError::Encoding)?;
        hasher.update(&bytes);
        Ok(format!("{}", hasher.finalize()))
    }

    /// Derives the seed for one (index, model) pair from the run seed.
    ///
    /// Independent of scheduling, so parallel runs stay reproducible.
    pub fn derived_seed(&self, index: &IndexId, model: ModelKind) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(index.as_str().as_bytes());
        hasher.update(model.as_str().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StockcastError,
        split::{SplitFractions, SplitMode},
    };

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("default config must be valid");
        assert_eq!(config.models().len(), 4);
        assert_eq!(config.cleaning().min_rows, 30);
        assert_eq!(config.seed(), 42);
    }

    #[test]
    fn test_invalid_configurations_are_fatal() {
        let bad_fractions = PipelineConfig::default().with_split(
            SplitConfig::default().with_fractions(SplitFractions::new(0.5, 0.2, 0.2)),
        );
        assert!(matches!(
            bad_fractions.validate(),
            Err(StockcastError::Config(ConfigError::SplitFractionsSum { .. }))
        ));

        let bad_window =
            PipelineConfig::default().with_features(FeatureConfig::default().with_window(0));
        assert!(matches!(
            bad_window.validate(),
            Err(StockcastError::Config(ConfigError::InvalidWindow(0)))
        ));

        let no_models = PipelineConfig::default().with_models(Vec::new());
        assert!(matches!(
            no_models.validate(),
            Err(StockcastError::Config(ConfigError::NoModels))
        ));

        let no_folds = PipelineConfig::default().with_split(SplitConfig::default().with_mode(
            SplitMode::WalkForward {
                folds: 0,
                min_train_rows: 20,
            },
        ));
        assert!(no_folds.validate().is_err());
    }

    #[test]
    fn test_json_partial_override() {
        let json = r#"{
            "features": { "window": 10 },
            "split": { "mode": { "kind": "walk_forward", "folds": 4, "min_train_rows": 50 } },
            "models": ["xgboost", "knn"],
            "indices": ["NYA", "N225"],
            "seed": 7
        }"#;
        let config = PipelineConfig::from_json_str(json).expect("valid json config");

        assert_eq!(config.features().window, 10);
        assert_eq!(config.features().lags, 3);
        assert_eq!(
            config.split().mode,
            SplitMode::WalkForward {
                folds: 4,
                min_train_rows: 50
            }
        );
        assert_eq!(
            config.models(),
            &[ModelKind::GradientBoosting, ModelKind::Knn]
        );
        assert_eq!(config.indices().map(BTreeSet::len), Some(2));
        assert_eq!(config.seed(), 7);

        assert!(PipelineConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = PipelineConfig::default();
        let b = PipelineConfig::default();
        let c = PipelineConfig::default().with_seed(1);

        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
    }

    #[test]
    fn test_derived_seeds_differ_per_pair() {
        let config = PipelineConfig::default();
        let nya = IndexId::new("NYA");
        let hsi = IndexId::new("HSI");

        let s1 = config.derived_seed(&nya, ModelKind::DecisionTree);
        assert_eq!(s1, config.derived_seed(&nya, ModelKind::DecisionTree));
        assert_ne!(s1, config.derived_seed(&hsi, ModelKind::DecisionTree));
        assert_ne!(s1, config.derived_seed(&nya, ModelKind::GradientBoosting));
    }

    #[test]
    fn test_models_are_deduplicated() {
        let config = PipelineConfig::default().with_models(vec![
            ModelKind::Knn,
            ModelKind::DecisionTree,
            ModelKind::Knn,
        ]);
        assert_eq!(config.models(), &[ModelKind::Knn, ModelKind::DecisionTree]);
    }
}
