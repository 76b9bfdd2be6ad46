pub mod decision_tree;
pub mod design;
pub mod gradient_boosting;
pub mod knn;
pub mod logistic;

use std::fmt::Debug;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{ModelError, StockcastResult},
    model::{
        decision_tree::{DecisionTree, TreeParams},
        design::StandardScaler,
        gradient_boosting::{BoostingParams, GradientBoosting},
        knn::{Knn, KnnParams},
        logistic::{LogisticParams, LogisticRegression},
    },
};

/// Probability threshold above which a row is classified `Up`.
pub const DECISION_THRESHOLD: f64 = 0.5;

// ================================================================================================
// Model Kinds
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[strum(to_string = "logistic_regression", serialize = "logistic")]
    LogisticRegression,

    DecisionTree,

    Knn,

    /// Logistic-loss boosted trees with second-order leaf weights.
    #[strum(to_string = "xgboost", serialize = "gradient_boosting")]
    #[serde(rename = "xgboost", alias = "gradient_boosting")]
    GradientBoosting,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Only the decision tree runs on raw features; the boosted trees are standardized
    /// along with the linear and distance models.
    pub fn needs_scaling(&self) -> bool {
        !matches!(self, ModelKind::DecisionTree)
    }

    pub fn default_params(&self) -> ModelParams {
        match self {
            ModelKind::LogisticRegression => {
                ModelParams::LogisticRegression(LogisticParams::default())
            }
            ModelKind::DecisionTree => ModelParams::DecisionTree(TreeParams::default()),
            ModelKind::Knn => ModelParams::Knn(KnnParams::default()),
            ModelKind::GradientBoosting => {
                ModelParams::GradientBoosting(BoostingParams::default())
            }
        }
    }

    /// Candidates tried during validation-based selection. The default comes first,
    /// so it wins ties.
    pub fn candidate_grid(&self) -> Vec<ModelParams> {
        match self {
            ModelKind::LogisticRegression => [1.0, 0.1, 10.0]
                .into_iter()
                .map(|c| {
                    ModelParams::LogisticRegression(LogisticParams {
                        c,
                        ..LogisticParams::default()
                    })
                })
                .collect(),
            ModelKind::DecisionTree => [10, 3, 5]
                .into_iter()
                .map(|max_depth| {
                    ModelParams::DecisionTree(TreeParams {
                        max_depth,
                        ..TreeParams::default()
                    })
                })
                .collect(),
            ModelKind::Knn => [5, 3, 11, 21]
                .into_iter()
                .map(|k| ModelParams::Knn(KnnParams { k }))
                .collect(),
            ModelKind::GradientBoosting => [(6, 0.1), (3, 0.1), (3, 0.3)]
                .into_iter()
                .map(|(max_depth, learning_rate)| {
                    ModelParams::GradientBoosting(BoostingParams {
                        max_depth,
                        learning_rate,
                        ..BoostingParams::default()
                    })
                })
                .collect(),
        }
    }
}

/// Hyperparameters of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParams {
    LogisticRegression(LogisticParams),
    DecisionTree(TreeParams),
    Knn(KnnParams),
    #[serde(rename = "xgboost")]
    GradientBoosting(BoostingParams),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::LogisticRegression(_) => ModelKind::LogisticRegression,
            ModelParams::DecisionTree(_) => ModelKind::DecisionTree,
            ModelParams::Knn(_) => ModelKind::Knn,
            ModelParams::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }
}

// ================================================================================================
// Classifier Trait
// ================================================================================================

/// A binary direction classifier. Labels are `1.0` (`Up`) and `0.0` (`Down`).
///
/// Implementations own their fitted state; `fit` replaces any previous fit.
pub trait Classifier: Debug + Send + Sync {
    fn kind(&self) -> ModelKind;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()>;

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>>;

    /// Probability of `Up` per row, or `None` if the model has no probability output.
    fn predict_probability(&self, _x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        Ok(None)
    }
}

/// Builds an unfitted classifier, standardizing inputs for the families that need it.
pub fn build(params: ModelParams, seed: u64) -> Box<dyn Classifier> {
    let model: Box<dyn Classifier> = match params {
        ModelParams::LogisticRegression(p) => Box::new(LogisticRegression::new(p)),
        ModelParams::DecisionTree(p) => Box::new(DecisionTree::new(p, seed)),
        ModelParams::Knn(p) => Box::new(Knn::new(p)),
        ModelParams::GradientBoosting(p) => Box::new(GradientBoosting::new(p, seed)),
    };

    if params.kind().needs_scaling() {
        Box::new(Standardized::new(model))
    } else {
        model
    }
}

/// Fits a [`StandardScaler`] on the training rows and applies it before the inner model.
#[derive(Debug)]
pub struct Standardized {
    scaler: Option<StandardScaler>,
    inner: Box<dyn Classifier>,
}

impl Standardized {
    pub fn new(inner: Box<dyn Classifier>) -> Self {
        Self {
            scaler: None,
            inner,
        }
    }

    fn scaler(&self) -> StockcastResult<&StandardScaler> {
        self.scaler.as_ref().ok_or_else(|| ModelError::NotFitted.into())
    }
}

impl Classifier for Standardized {
    fn kind(&self) -> ModelKind {
        self.inner.kind()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
        validate_training_data(x, y)?;
        let scaler = StandardScaler::fit(x);
        self.inner.fit(&scaler.transform(x)?, y)?;
        self.scaler = Some(scaler);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>> {
        self.inner.predict(&self.scaler()?.transform(x)?)
    }

    fn predict_probability(&self, x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        self.inner.predict_probability(&self.scaler()?.transform(x)?)
    }
}

// ================================================================================================
// Shared Helpers
// ================================================================================================

/// Rejects training data no classifier can learn from.
pub fn validate_training_data(x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingData.into());
    }
    if y.len() != x.nrows() {
        return Err(ModelError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        }
        .into());
    }
    if let Some(((row, column), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ModelError::NonFiniteFeature { row, column }.into());
    }

    let ups = y.iter().filter(|&&v| v >= DECISION_THRESHOLD).count();
    if ups == 0 {
        return Err(ModelError::SingleClass("down".to_string()).into());
    }
    if ups == y.len() {
        return Err(ModelError::SingleClass("up".to_string()).into());
    }
    Ok(())
}

pub(crate) fn check_features(x: &Array2<f64>, expected: usize) -> StockcastResult<()> {
    if x.ncols() != expected {
        return Err(ModelError::DimensionMismatch {
            expected,
            got: x.ncols(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn threshold(probabilities: &Array1<f64>) -> Array1<f64> {
    probabilities.mapv(|p| if p > DECISION_THRESHOLD { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ndarray::array;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::error::StockcastError;

    #[test]
    fn test_model_kind_names() {
        assert_eq!(ModelKind::GradientBoosting.to_string(), "xgboost");
        assert_eq!(ModelKind::from_str("xgboost").unwrap(), ModelKind::GradientBoosting);
        assert_eq!(
            ModelKind::from_str("gradient_boosting").unwrap(),
            ModelKind::GradientBoosting
        );
        assert_eq!(ModelKind::from_str("knn").unwrap(), ModelKind::Knn);
        assert_eq!(
            ModelKind::from_str("logistic").unwrap(),
            ModelKind::LogisticRegression
        );

        let json = serde_json::to_string(&ModelKind::GradientBoosting).unwrap();
        assert_eq!(json, "\"xgboost\"");
    }

    #[test]
    fn test_grids_start_with_defaults() {
        for kind in ModelKind::iter() {
            let grid = kind.candidate_grid();
            assert!(!grid.is_empty());
            assert_eq!(grid[0], kind.default_params());
            assert!(grid.iter().all(|p| p.kind() == kind));
        }
    }

    #[test]
    fn test_training_data_validation() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];

        let err = validate_training_data(&x, &array![1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            StockcastError::Model(ModelError::SingleClass(_))
        ));

        let bad = array![[1.0, f64::NAN], [3.0, 4.0]];
        let err = validate_training_data(&bad, &array![1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            StockcastError::Model(ModelError::NonFiniteFeature { row: 0, column: 1 })
        ));

        let empty = Array2::<f64>::zeros((0, 2));
        let err = validate_training_data(&empty, &Array1::zeros(0)).unwrap_err();
        assert!(matches!(
            err,
            StockcastError::Model(ModelError::EmptyTrainingData)
        ));

        assert!(validate_training_data(&x, &array![1.0, 0.0]).is_ok());
    }

    #[test]
    fn test_every_model_learns_a_threshold_rule() {
        // Up exactly when the first feature is positive.
        let n = 80;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let v = i as f64 - n as f64 / 2.0 + 0.5;
            if j == 0 { v } else { (i % 7) as f64 }
        });
        let y = x.column(0).mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });

        for kind in ModelKind::iter() {
            let mut model = build(kind.default_params(), 7);
            assert_eq!(model.kind(), kind);
            model.fit(&x, &y).expect("fit succeeds");

            let pred = model.predict(&x).expect("predict succeeds");
            let correct = pred.iter().zip(y.iter()).filter(|(a, b)| a == b).count();
            assert!(
                correct as f64 / n as f64 >= 0.9,
                "{kind} accuracy too low: {correct}/{n}"
            );

            let proba = model
                .predict_probability(&x)
                .expect("probability succeeds")
                .expect("all families expose probabilities");
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_unfitted_models_refuse_to_predict() {
        let x = array![[1.0, 2.0]];
        for kind in ModelKind::iter() {
            let model = build(kind.default_params(), 0);
            assert!(model.predict(&x).is_err(), "{kind} predicted before fit");
        }
    }
}
