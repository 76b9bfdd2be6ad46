use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{IndexId, Split},
    harness::ModelResult,
    metrics::{ClassificationMetrics, ConfusionMatrix},
    model::ModelKind,
};

/// Cross-index summary of one model on one split.
///
/// Every metric is the unweighted mean over indices. Walk-forward folds are
/// averaged within their index first, so each index counts once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub model: ModelKind,
    pub split: Split,
    pub n_indices: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean over the indices where it was defined.
    pub roc_auc: Option<f64>,
    pub roc_auc_indices: usize,
    pub log_loss: Option<f64>,
    pub brier_score: Option<f64>,
    /// Summed over indices and folds.
    pub confusion: ConfusionMatrix,
}

/// Per-index view of one (model, split) after averaging folds.
struct IndexMean {
    accuracy: f64,
    precision: f64,
    recall: f64,
    f1: f64,
    roc_auc: Option<f64>,
    log_loss: Option<f64>,
    brier_score: Option<f64>,
}

impl IndexMean {
    fn from_folds(folds: &[&ClassificationMetrics]) -> Option<Self> {
        Some(Self {
            accuracy: mean(folds.iter().map(|m| m.accuracy))?,
            precision: mean(folds.iter().map(|m| m.precision))?,
            recall: mean(folds.iter().map(|m| m.recall))?,
            f1: mean(folds.iter().map(|m| m.f1))?,
            roc_auc: mean(folds.iter().filter_map(|m| m.roc_auc)),
            log_loss: mean(folds.iter().filter_map(|m| m.log_loss)),
            brier_score: mean(folds.iter().filter_map(|m| m.brier_score)),
        })
    }
}

/// Builds one comparison row per (model, split), ordered by model then split.
pub fn aggregate(results: &[ModelResult]) -> Vec<ComparisonRow> {
    let mut groups: BTreeMap<(ModelKind, Split), BTreeMap<&IndexId, Vec<&ClassificationMetrics>>> =
        BTreeMap::new();
    for result in results {
        groups
            .entry((result.model, result.split))
            .or_default()
            .entry(&result.index)
            .or_default()
            .push(&result.metrics);
    }

    groups
        .into_iter()
        .filter_map(|((model, split), by_index)| {
            let confusion = by_index
                .values()
                .flatten()
                .fold(ConfusionMatrix::default(), |acc, m| add(acc, &m.confusion));
            let means = by_index
                .values()
                .filter_map(|folds| IndexMean::from_folds(folds))
                .collect::<Vec<_>>();

            Some(ComparisonRow {
                model,
                split,
                n_indices: means.len(),
                accuracy: mean(means.iter().map(|m| m.accuracy))?,
                precision: mean(means.iter().map(|m| m.precision))?,
                recall: mean(means.iter().map(|m| m.recall))?,
                f1: mean(means.iter().map(|m| m.f1))?,
                roc_auc: mean(means.iter().filter_map(|m| m.roc_auc)),
                roc_auc_indices: means.iter().filter(|m| m.roc_auc.is_some()).count(),
                log_loss: mean(means.iter().filter_map(|m| m.log_loss)),
                brier_score: mean(means.iter().filter_map(|m| m.brier_score)),
                confusion,
            })
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn add(a: ConfusionMatrix, b: &ConfusionMatrix) -> ConfusionMatrix {
    ConfusionMatrix {
        true_positive: a.true_positive + b.true_positive,
        true_negative: a.true_negative + b.true_negative,
        false_positive: a.false_positive + b.false_positive,
        false_negative: a.false_negative + b.false_negative,
    }
}
