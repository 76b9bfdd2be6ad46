pub mod aggregate;
mod evaluate;

use std::collections::BTreeMap;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::{ThreadPoolBuilder, prelude::*};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tracing::{info, warn};

use crate::{
    config::PipelineConfig,
    data::{
        domain::{IndexId, Split},
        ingest::{RawDataset, RawPriceRow},
    },
    error::{DataError, ModelError, StockcastError, StockcastResult, SystemError},
    harness::evaluate::{IndexOutcome, evaluate_index},
    metrics::{ClassificationMetrics, ReliabilityBin},
    model::{ModelKind, ModelParams},
    report::RunReport,
};

// ================================================================================================
// Result Types
// ================================================================================================

/// Metrics of one model on one split of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub index: IndexId,
    pub model: ModelKind,
    pub split: Split,
    /// Walk-forward fold number for validation rows, `None` otherwise.
    pub fold: Option<usize>,
    pub metrics: ClassificationMetrics,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SingleClassTrainingData,
    NonFiniteFeatures,
    EmptyTrainingData,
    FitFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl From<&StockcastError> for FailureReason {
    fn from(err: &StockcastError) -> Self {
        match err {
            StockcastError::Model(ModelError::SingleClass(_)) => Self::SingleClassTrainingData,
            StockcastError::Model(ModelError::NonFiniteFeature { .. }) => Self::NonFiniteFeatures,
            StockcastError::Model(ModelError::EmptyTrainingData) => Self::EmptyTrainingData,
            _ => Self::FitFailed,
        }
    }
}

/// A model that could not be evaluated on one index. The run continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub index: IndexId,
    pub model: ModelKind,
    pub reason: FailureReason,
    pub message: String,
}

impl ModelFailure {
    pub fn new(index: IndexId, model: ModelKind, err: &StockcastError) -> Self {
        Self {
            index,
            model,
            reason: err.into(),
            message: err.to_string(),
        }
    }
}

/// Hyperparameters chosen for one (index, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub index: IndexId,
    pub model: ModelKind,
    pub params: ModelParams,
    /// Accuracy of the chosen candidate on validation data, if there was any.
    pub validation_accuracy: Option<f64>,
    pub candidates_evaluated: usize,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum ExclusionReason {
    #[strum(serialize = "insufficient data")]
    #[serde(rename = "insufficient data")]
    InsufficientData,

    #[strum(serialize = "insufficient data for split")]
    #[serde(rename = "insufficient data for split")]
    InsufficientDataForSplit,

    #[strum(serialize = "not found")]
    #[serde(rename = "not found")]
    NotFound,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// An index that contributes no metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexExclusion {
    pub index: IndexId,
    pub reason: ExclusionReason,
    pub detail: String,
}

/// Calibration of one model's test-split probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityTable {
    pub index: IndexId,
    pub model: ModelKind,
    pub bins: Vec<ReliabilityBin>,
}

// ================================================================================================
// Pipeline
// ================================================================================================

/// Runs cleaning, feature engineering, splitting and model evaluation for every index.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    progress: bool,
}

impl Pipeline {
    /// Validates the configuration. Invalid configurations never reach the data.
    pub fn new(config: PipelineConfig) -> StockcastResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress: false,
        })
    }

    pub fn with_progress(self, progress: bool) -> Self {
        Self { progress, ..self }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[tracing::instrument(skip_all, fields(indices = dataset.series().len(), seed = self.config.seed()))]
    pub fn run(&self, dataset: &RawDataset) -> StockcastResult<RunReport> {
        if dataset.is_empty() {
            return Err(DataError::NoValidData("input contains no rows".to_string()).into());
        }

        let (targets, mut exclusions) = self.targets(dataset);
        for exclusion in &exclusions {
            warn!(index = %exclusion.index, reason = %exclusion.reason, "Index Excluded");
        }

        let outcomes = match self.config.threads() {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| SystemError::ThreadPool(e.to_string()))?
                .install(|| self.evaluate_all(&targets))?,
            None => self.evaluate_all(&targets)?,
        };

        let included = outcomes.iter().filter(|o| o.exclusion.is_none()).count();
        if included == 0 {
            return Err(DataError::NoValidData(format!(
                "all {} indices were excluded",
                targets.len() + exclusions.len()
            ))
            .into());
        }

        let mut audits = BTreeMap::new();
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut selections = Vec::new();
        let mut reliability = Vec::new();
        for outcome in outcomes {
            audits.insert(outcome.index, outcome.audit);
            exclusions.extend(outcome.exclusion);
            results.extend(outcome.results);
            failures.extend(outcome.failures);
            selections.extend(outcome.selections);
            reliability.extend(outcome.reliability);
        }

        results.sort_by(|a, b| {
            (&a.index, a.model, a.split, a.fold).cmp(&(&b.index, b.model, b.split, b.fold))
        });
        exclusions.sort_by(|a, b| a.index.cmp(&b.index));
        failures.sort_by(|a, b| (&a.index, a.model).cmp(&(&b.index, b.model)));
        selections.sort_by(|a, b| (&a.index, a.model).cmp(&(&b.index, b.model)));
        reliability.sort_by(|a, b| (&a.index, a.model).cmp(&(&b.index, b.model)));

        let comparison = aggregate::aggregate(&results);

        info!(
            included,
            excluded = exclusions.len(),
            results = results.len(),
            failures = failures.len(),
            "Run Completed"
        );

        Ok(RunReport {
            config_hash: self.config.hash()?,
            config: self.config.clone(),
            results,
            comparison,
            audits,
            exclusions,
            failures,
            selections,
            reliability,
            rows_without_index: dataset.rows_without_index(),
            rejected_files: dataset.rejected_files().to_vec(),
        })
    }

    /// Indices to evaluate, plus exclusions for requested indices absent from the input.
    fn targets<'a>(
        &self,
        dataset: &'a RawDataset,
    ) -> (Vec<(&'a IndexId, &'a [RawPriceRow])>, Vec<IndexExclusion>) {
        let Some(requested) = self.config.indices() else {
            let all = dataset
                .series()
                .iter()
                .map(|(index, rows)| (index, rows.as_slice()))
                .collect();
            return (all, Vec::new());
        };

        let mut targets = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for index in requested {
            match dataset.series().get_key_value(index) {
                Some((index, rows)) => targets.push((index, rows.as_slice())),
                None => missing.push(IndexExclusion {
                    index: index.clone(),
                    reason: ExclusionReason::NotFound,
                    detail: "index not present in the input data".to_string(),
                }),
            }
        }
        (targets, missing)
    }

    fn evaluate_all(
        &self,
        targets: &[(&IndexId, &[RawPriceRow])],
    ) -> StockcastResult<Vec<IndexOutcome>> {
        let bar = self
            .progress
            .then(|| progress_bar(targets.len() as u64))
            .transpose()?;

        let outcomes = targets
            .par_iter()
            .map(|(index, rows)| {
                let outcome = evaluate_index(index, rows, &self.config);
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                outcome
            })
            .collect::<StockcastResult<Vec<_>>>();

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        outcomes
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn progress_bar(capacity: u64) -> StockcastResult<ProgressBar> {
    let bar = ProgressBar::new(capacity);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} indices ({eta_precise}) {msg}")
            .map_err(SystemError::ProgressBar)?
            .progress_chars("#>-"));
    Ok(bar)
}
