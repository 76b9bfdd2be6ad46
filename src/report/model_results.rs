use std::sync::Arc;

use polars::{
    df,
    frame::DataFrame,
    prelude::{DataType, Field, PlSmallStr, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{StockcastError, StockcastResult},
    harness::ModelResult,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_stockcast_error,
    },
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModelResultCol {
    Index,
    IndexName,
    Model,
    Split,
    Fold,
    NSamples,
    Accuracy,
    Precision,
    Recall,
    F1,
    RocAuc,
    LogLoss,
    BrierScore,
    TruePositive,
    TrueNegative,
    FalsePositive,
    FalseNegative,
}

impl From<ModelResultCol> for PlSmallStr {
    fn from(value: ModelResultCol) -> Self {
        value.as_str().into()
    }
}

impl ModelResultCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One row per (index, model, split[, fold]), sorted in that order.
///
/// # Example Table
///
/// | index | index_name | model               | split      | fold | n_samples | accuracy | ... |
/// |-------|------------|---------------------|------------|------|-----------|----------|-----|
/// | NYA   | New York   | logistic_regression | train      |      | 346       | 0.54     | ... |
/// | NYA   | New York   | logistic_regression | validation | 1    | 24        | 0.50     | ... |
/// | NYA   | New York   | logistic_regression | test       |      | 75        | 0.52     | ... |
#[derive(Clone, Debug)]
pub struct ModelResults {
    df: DataFrame,
}

impl ReportName for ModelResults {
    fn base_name(&self) -> String {
        "model_results".to_string()
    }
}

impl Report for ModelResults {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for ModelResults {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = ModelResultCol::iter()
            .map(|col| {
                let dtype = match col {
                    ModelResultCol::Index
                    | ModelResultCol::IndexName
                    | ModelResultCol::Model
                    | ModelResultCol::Split => DataType::String,

                    ModelResultCol::Fold => DataType::UInt32,

                    ModelResultCol::NSamples
                    | ModelResultCol::TruePositive
                    | ModelResultCol::TrueNegative
                    | ModelResultCol::FalsePositive
                    | ModelResultCol::FalseNegative => DataType::UInt64,

                    ModelResultCol::Accuracy
                    | ModelResultCol::Precision
                    | ModelResultCol::Recall
                    | ModelResultCol::F1
                    | ModelResultCol::RocAuc
                    | ModelResultCol::LogLoss
                    | ModelResultCol::BrierScore => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl<'a> TryFrom<&'a [ModelResult]> for ModelResults {
    type Error = StockcastError;

    fn try_from(results: &'a [ModelResult]) -> StockcastResult<Self> {
        Ok(Self {
            df: ModelResultsSoA::from(results).try_into()?,
        })
    }
}

#[derive(Default)]
struct ModelResultsSoA {
    index: Vec<String>,
    index_name: Vec<String>,
    model: Vec<&'static str>,
    split: Vec<&'static str>,
    fold: Vec<Option<u32>>,
    n_samples: Vec<u64>,
    accuracy: Vec<f64>,
    precision: Vec<f64>,
    recall: Vec<f64>,
    f1: Vec<f64>,
    roc_auc: Vec<Option<f64>>,
    log_loss: Vec<Option<f64>>,
    brier_score: Vec<Option<f64>>,
    true_positive: Vec<u64>,
    true_negative: Vec<u64>,
    false_positive: Vec<u64>,
    false_negative: Vec<u64>,
}

impl<'a> From<&'a [ModelResult]> for ModelResultsSoA {
    fn from(results: &'a [ModelResult]) -> Self {
        let mut soa = Self::default();
        for r in results {
            let m = &r.metrics;
            soa.index.push(r.index.to_string());
            soa.index_name.push(r.index.display_name().to_string());
            soa.model.push(r.model.as_str());
            soa.split.push(r.split.as_str());
            soa.fold.push(r.fold.map(|f| f as u32));
            soa.n_samples.push(m.n_samples as u64);
            soa.accuracy.push(m.accuracy);
            soa.precision.push(m.precision);
            soa.recall.push(m.recall);
            soa.f1.push(m.f1);
            soa.roc_auc.push(m.roc_auc);
            soa.log_loss.push(m.log_loss);
            soa.brier_score.push(m.brier_score);
            soa.true_positive.push(m.confusion.true_positive as u64);
            soa.true_negative.push(m.confusion.true_negative as u64);
            soa.false_positive.push(m.confusion.false_positive as u64);
            soa.false_negative.push(m.confusion.false_negative as u64);
        }
        soa
    }
}

impl TryFrom<ModelResultsSoA> for DataFrame {
    type Error = StockcastError;

    fn try_from(value: ModelResultsSoA) -> Result<Self, Self::Error> {
        df!(
            ModelResultCol::Index.to_string() => value.index,
            ModelResultCol::IndexName.to_string() => value.index_name,
            ModelResultCol::Model.to_string() => value.model,
            ModelResultCol::Split.to_string() => value.split,
            ModelResultCol::Fold.to_string() => value.fold,
            ModelResultCol::NSamples.to_string() => value.n_samples,
            ModelResultCol::Accuracy.to_string() => value.accuracy,
            ModelResultCol::Precision.to_string() => value.precision,
            ModelResultCol::Recall.to_string() => value.recall,
            ModelResultCol::F1.to_string() => value.f1,
            ModelResultCol::RocAuc.to_string() => value.roc_auc,
            ModelResultCol::LogLoss.to_string() => value.log_loss,
            ModelResultCol::BrierScore.to_string() => value.brier_score,
            ModelResultCol::TruePositive.to_string() => value.true_positive,
            ModelResultCol::TrueNegative.to_string() => value.true_negative,
            ModelResultCol::FalsePositive.to_string() => value.false_positive,
            ModelResultCol::FalseNegative.to_string() => value.false_negative,
        )
        .map_err(|e| polars_to_stockcast_error("model results", e))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{
        data::domain::{IndexId, Split},
        metrics::ClassificationMetrics,
        model::ModelKind,
        report::io::ToJson,
    };

    #[test]
    fn test_frame_matches_schema() {
        let results = vec![
            ModelResult {
                index: IndexId::new("NYA"),
                model: ModelKind::GradientBoosting,
                split: Split::Validation,
                fold: Some(2),
                metrics: ClassificationMetrics::calculate(
                    &array![1.0, 0.0, 1.0],
                    &array![1.0, 1.0, 1.0],
                    Some(&array![0.8, 0.6, 0.7]),
                ),
            },
            ModelResult {
                index: IndexId::new("NYA"),
                model: ModelKind::Knn,
                split: Split::Test,
                fold: None,
                metrics: ClassificationMetrics::calculate(
                    &array![1.0, 1.0],
                    &array![1.0, 0.0],
                    None,
                ),
            },
        ];

        let report = ModelResults::try_from(results.as_slice()).expect("builds");
        assert_eq!(report.as_df().height(), 2);
        assert_eq!(report.as_df().width(), ModelResultCol::COUNT);

        let json = report.to_json().expect("json");
        let rows = json.as_array().expect("rows");
        assert_eq!(rows[0]["index_name"], "New York");
        assert_eq!(rows[0]["model"], "xgboost");
        assert_eq!(rows[0]["split"], "validation");
        assert_eq!(rows[0]["fold"], 2);
        assert_eq!(rows[0]["false_positive"], 1);
        assert_eq!(rows[1]["fold"], serde_json::Value::Null);
        assert_eq!(rows[1]["roc_auc"], serde_json::Value::Null);
    }

    #[test]
    fn test_empty_results_build_an_empty_frame() {
        let empty: Vec<ModelResult> = Vec::new();
        let report = ModelResults::try_from(empty.as_slice()).expect("builds");
        assert_eq!(report.as_df().height(), 0);
    }
}
