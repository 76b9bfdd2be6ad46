// 1. Traits
pub use crate::math::indicator::StreamingIndicator;
pub use crate::model::Classifier;
pub use crate::report::io::{AsFormattedLazyFrame, Report, ReportName, ToCsv, ToJson, ToJsonFile};

// 2. Pipeline
pub use crate::config::PipelineConfig;
pub use crate::harness::{
    ExclusionReason, FailureReason, IndexExclusion, ModelFailure, ModelResult, ModelSelection,
    Pipeline, ReliabilityTable, aggregate::ComparisonRow,
};
pub use crate::report::{
    RunReport, model_comparison::ModelComparison, model_results::ModelResults,
    summary::RunSummary,
};

// 3. Data
pub use crate::data::clean::{CleanedSeries, CleaningAudit, CleaningConfig, clean_series};
pub use crate::data::domain::{Direction, IndexId, PriceRecord, Split};
pub use crate::data::ingest::{RawDataset, RawPriceRow, load_inputs, read_csv};

// 4. Features, Labels & Splits
pub use crate::features::{FeatureConfig, FeatureRow, engineer};
pub use crate::labels::{LabeledExample, label};
pub use crate::split::{EvaluationPlan, SplitConfig, SplitFractions, SplitMode, plan};

// 5. Models & Metrics
pub use crate::metrics::{ClassificationMetrics, ConfusionMatrix, ReliabilityBin};
pub use crate::model::{ModelKind, ModelParams, build};

// 6. Errors
pub use crate::error::{StockcastError, StockcastResult};
