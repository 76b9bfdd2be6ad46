pub mod io;
pub mod model_comparison;
pub mod model_results;
pub(crate) mod polars_ext;
pub mod summary;

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    config::PipelineConfig,
    data::{
        clean::CleaningAudit,
        domain::{IndexId, Split},
        ingest::RejectedFile,
    },
    error::StockcastResult,
    harness::{
        IndexExclusion, ModelFailure, ModelResult, ModelSelection, ReliabilityTable,
        aggregate::ComparisonRow,
    },
    report::{
        io::{ToCsv, ToJsonFile, write_json},
        model_comparison::ModelComparison,
        model_results::ModelResults,
        summary::{RUN_SUMMARY_FILE, RunSummary},
    },
};

/// In-memory outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub config: PipelineConfig,
    pub config_hash: String,
    /// Sorted by (index, model, split, fold).
    pub results: Vec<ModelResult>,
    pub comparison: Vec<ComparisonRow>,
    pub audits: BTreeMap<IndexId, CleaningAudit>,
    pub exclusions: Vec<IndexExclusion>,
    pub failures: Vec<ModelFailure>,
    pub selections: Vec<ModelSelection>,
    pub reliability: Vec<ReliabilityTable>,
    pub rows_without_index: usize,
    pub rejected_files: Vec<RejectedFile>,
}

impl RunReport {
    /// Indices with at least one metric row.
    pub fn indices_evaluated(&self) -> BTreeSet<&IndexId> {
        self.results.iter().map(|r| &r.index).collect()
    }

    /// Comparison rows of one split, in model order.
    pub fn comparison_for(&self, split: Split) -> impl Iterator<Item = &ComparisonRow> {
        self.comparison.iter().filter(move |r| r.split == split)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            config_hash: self.config_hash.clone(),
            config: self.config.clone(),
            indices_evaluated: self.indices_evaluated().into_iter().cloned().collect(),
            cleaning_audits: self.audits.clone(),
            excluded_indices: self.exclusions.clone(),
            model_failures: self.failures.clone(),
            selected_hyperparameters: self.selections.clone(),
            reliability: self.reliability.clone(),
            rows_without_index: self.rows_without_index,
            rejected_files: self.rejected_files.clone(),
        }
    }

    /// Writes the result tables (CSV + JSON) and the run summary into `dir`.
    ///
    /// Returns the written paths.
    #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn write(&self, dir: impl AsRef<Path>) -> StockcastResult<Vec<PathBuf>> {
        let dir = dir.as_ref();

        let results = ModelResults::try_from(self.results.as_slice())?;
        let comparison = ModelComparison::try_from(self.comparison.as_slice())?;

        let summary_path = dir.join(RUN_SUMMARY_FILE);
        let paths = vec![
            results.to_csv(dir, None, None)?,
            results.to_json_file(dir)?,
            comparison.to_csv(dir, None, None)?,
            comparison.to_json_file(dir)?,
        ];
        write_json(&summary_path, &self.summary())?;

        let paths = paths.into_iter().chain([summary_path]).collect::<Vec<_>>();
        info!(files = paths.len(), "Reports Written");
        Ok(paths)
    }
}
