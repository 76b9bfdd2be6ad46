use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, StockcastResult},
    metrics::log_loss,
    model::{Classifier, ModelKind, check_features, threshold, validate_training_data},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse L2 regularization strength.
    pub c: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the loss improves by less than this.
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
struct LogisticFit {
    weights: Array1<f64>,
    bias: f64,
}

/// L2-regularized logistic regression trained with batch gradient descent.
///
/// Minimizes the mean log loss plus `||w||^2 / (2 * C * n)`, which matches the
/// `C`-weighted objective of the common liblinear formulation up to scale.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    params: LogisticParams,
    fit: Option<LogisticFit>,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self { params, fit: None }
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        log_loss(y, p).unwrap_or(0.0)
    }

    fn fitted(&self) -> StockcastResult<&LogisticFit> {
        self.fit.as_ref().ok_or_else(|| ModelError::NotFitted.into())
    }
}

impl Classifier for LogisticRegression {
    fn kind(&self) -> ModelKind {
        ModelKind::LogisticRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
        validate_training_data(x, y)?;
        let LogisticParams {
            c,
            learning_rate,
            max_iter,
            tolerance,
        } = self.params;
        if !(c > 0.0 && learning_rate > 0.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "logistic regression needs c > 0 and learning_rate > 0, got c={c}, learning_rate={learning_rate}"
            ))
            .into());
        }

        let n = x.nrows() as f64;
        let alpha = 1.0 / (c * n);
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut previous_loss = f64::INFINITY;

        for _ in 0..max_iter {
            let p = (x.dot(&weights) + bias).mapv(Self::sigmoid);
            let loss = Self::loss(y, &p) + 0.5 * alpha * weights.dot(&weights);
            if (previous_loss - loss).abs() < tolerance {
                break;
            }
            previous_loss = loss;

            let errors = &p - y;
            let dw = x.t().dot(&errors) / n + &weights * alpha;
            let db = errors.sum() / n;

            weights = weights - dw * learning_rate;
            bias -= learning_rate * db;
        }

        self.fit = Some(LogisticFit { weights, bias });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>> {
        let proba = self
            .predict_probability(x)?
            .ok_or(ModelError::NotFitted)?;
        Ok(threshold(&proba))
    }

    fn predict_probability(&self, x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        let fit = self.fitted()?;
        check_features(x, fit.weights.len())?;
        Ok(Some((x.dot(&fit.weights) + fit.bias).mapv(Self::sigmoid)))
    }
}
