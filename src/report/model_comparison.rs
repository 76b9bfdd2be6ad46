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
    harness::aggregate::ComparisonRow,
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
pub enum ModelComparisonCol {
    Model,
    Split,
    NIndices,
    Accuracy,
    Precision,
    Recall,
    F1,
    RocAuc,
    RocAucIndices,
    LogLoss,
    BrierScore,
    TruePositive,
    TrueNegative,
    FalsePositive,
    FalseNegative,
}

impl From<ModelComparisonCol> for PlSmallStr {
    fn from(value: ModelComparisonCol) -> Self {
        value.as_str().into()
    }
}

impl ModelComparisonCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Cross-index comparison of every model on every split.
///
/// Metrics are unweighted means over the included indices; confusion counts are sums.
#[derive(Clone, Debug)]
pub struct ModelComparison {
    df: DataFrame,
}

impl ReportName for ModelComparison {
    fn base_name(&self) -> String {
        "model_comparison".to_string()
    }
}

impl Report for ModelComparison {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for ModelComparison {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = ModelComparisonCol::iter()
            .map(|col| {
                let dtype = match col {
                    ModelComparisonCol::Model | ModelComparisonCol::Split => DataType::String,

                    ModelComparisonCol::NIndices | ModelComparisonCol::RocAucIndices => {
                        DataType::UInt32
                    }

                    ModelComparisonCol::TruePositive
                    | ModelComparisonCol::TrueNegative
                    | ModelComparisonCol::FalsePositive
                    | ModelComparisonCol::FalseNegative => DataType::UInt64,

                    ModelComparisonCol::Accuracy
                    | ModelComparisonCol::Precision
                    | ModelComparisonCol::Recall
                    | ModelComparisonCol::F1
                    | ModelComparisonCol::RocAuc
                    | ModelComparisonCol::LogLoss
                    | ModelComparisonCol::BrierScore => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl<'a> TryFrom<&'a [ComparisonRow]> for ModelComparison {
    type Error = StockcastError;

    fn try_from(rows: &'a [ComparisonRow]) -> StockcastResult<Self> {
        let df = df!(
            ModelComparisonCol::Model.to_string() => rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
            ModelComparisonCol::Split.to_string() => rows.iter().map(|r| r.split.as_str()).collect::<Vec<_>>(),
            ModelComparisonCol::NIndices.to_string() => rows.iter().map(|r| r.n_indices as u32).collect::<Vec<_>>(),
            ModelComparisonCol::Accuracy.to_string() => rows.iter().map(|r| r.accuracy).collect::<Vec<_>>(),
            ModelComparisonCol::Precision.to_string() => rows.iter().map(|r| r.precision).collect::<Vec<_>>(),
            ModelComparisonCol::Recall.to_string() => rows.iter().map(|r| r.recall).collect::<Vec<_>>(),
            ModelComparisonCol::F1.to_string() => rows.iter().map(|r| r.f1).collect::<Vec<_>>(),
            ModelComparisonCol::RocAuc.to_string() => rows.iter().map(|r| r.roc_auc).collect::<Vec<_>>(),
            ModelComparisonCol::RocAucIndices.to_string() => rows.iter().map(|r| r.roc_auc_indices as u32).collect::<Vec<_>>(),
            ModelComparisonCol::LogLoss.to_string() => rows.iter().map(|r| r.log_loss).collect::<Vec<_>>(),
            ModelComparisonCol::BrierScore.to_string() => rows.iter().map(|r| r.brier_score).collect::<Vec<_>>(),
            ModelComparisonCol::TruePositive.to_string() => rows.iter().map(|r| r.confusion.true_positive as u64).collect::<Vec<_>>(),
            ModelComparisonCol::TrueNegative.to_string() => rows.iter().map(|r| r.confusion.true_negative as u64).collect::<Vec<_>>(),
            ModelComparisonCol::FalsePositive.to_string() => rows.iter().map(|r| r.confusion.false_positive as u64).collect::<Vec<_>>(),
            ModelComparisonCol::FalseNegative.to_string() => rows.iter().map(|r| r.confusion.false_negative as u64).collect::<Vec<_>>(),
        )
        .map_err(|e| polars_to_stockcast_error("model comparison", e))?;

        Ok(Self { df })
    }
}
