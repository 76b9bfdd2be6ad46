use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineConfig,
    data::{clean::CleaningAudit, domain::IndexId, ingest::RejectedFile},
    harness::{IndexExclusion, ModelFailure, ModelSelection, ReliabilityTable},
};

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Everything about a run that is not a metric table.
///
/// Serialized to `run_summary.json` next to the CSV/JSON reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Hash of `config`; identical hashes mean identical settings.
    pub config_hash: String,
    pub config: PipelineConfig,
    /// Indices that contributed metrics, in sorted order.
    pub indices_evaluated: Vec<IndexId>,
    pub cleaning_audits: BTreeMap<IndexId, CleaningAudit>,
    pub excluded_indices: Vec<IndexExclusion>,
    pub model_failures: Vec<ModelFailure>,
    pub selected_hyperparameters: Vec<ModelSelection>,
    pub reliability: Vec<ReliabilityTable>,
    pub rows_without_index: usize,
    /// Input files that could not be read as price data.
    pub rejected_files: Vec<RejectedFile>,
}

impl RunSummary {
    pub fn excluded(&self, index: &IndexId) -> Option<&IndexExclusion> {
        self.excluded_indices.iter().find(|e| &e.index == index)
    }
}
