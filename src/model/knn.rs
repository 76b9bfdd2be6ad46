use ndarray::{Array1, Array2, ArrayView1};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, StockcastResult},
    model::{Classifier, ModelKind, check_features, threshold, validate_training_data},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    pub k: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { k: 5 }
    }
}

/// Uniform-vote k-nearest-neighbors with Euclidean distance.
///
/// Equidistant neighbors are ordered by training row, so earlier rows win.
/// When `k` exceeds the training size, every training row votes.
#[derive(Debug, Clone)]
pub struct Knn {
    params: KnnParams,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Knn {
    pub fn new(params: KnnParams) -> Self {
        Self {
            params,
            x_train: None,
            y_train: None,
        }
    }

    fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }

    fn up_fraction(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        row: ArrayView1<f64>,
    ) -> f64 {
        let mut distances = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train)| (OrderedFloat(Self::squared_distance(row, train)), i))
            .collect::<Vec<_>>();

        let k = self.params.k.min(distances.len());
        if k < distances.len() {
            distances.select_nth_unstable(k - 1);
            distances.truncate(k);
        }

        distances.iter().map(|&(_, i)| y_train[i]).sum::<f64>() / k as f64
    }
}

impl Classifier for Knn {
    fn kind(&self) -> ModelKind {
        ModelKind::Knn
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
        validate_training_data(x, y)?;
        if self.params.k == 0 {
            return Err(ModelError::InvalidHyperparameter("k must be positive".to_string()).into());
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>> {
        let proba = self
            .predict_probability(x)?
            .ok_or(ModelError::NotFitted)?;
        Ok(threshold(&proba))
    }

    /// Fraction of `Up` votes among the neighbors.
    fn predict_probability(&self, x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(ModelError::NotFitted.into());
        };
        check_features(x, x_train.ncols())?;

        Ok(Some(
            x.rows()
                .into_iter()
                .map(|row| self.up_fraction(x_train, y_train, row))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_votes_of_nearest_neighbors() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut knn = Knn::new(KnnParams { k: 3 });
        knn.fit(&x, &y).expect("fit");

        let proba = knn
            .predict_probability(&array![[0.4], [11.2]])
            .expect("proba")
            .expect("some");
        assert!((proba[0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(proba[1], 1.0);
        assert_eq!(
            knn.predict(&array![[0.4], [11.2]]).expect("predict"),
            array![0.0, 1.0]
        );
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 1.0];
        let mut knn = Knn::new(KnnParams { k: 50 });
        knn.fit(&x, &y).expect("fit");

        let proba = knn
            .predict_probability(&array![[100.0]])
            .expect("proba")
            .expect("some");
        assert!((proba[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_even_split_is_down() {
        let x = array![[0.0], [2.0]];
        let y = array![0.0, 1.0];
        let mut knn = Knn::new(KnnParams { k: 2 });
        knn.fit(&x, &y).expect("fit");
        assert_eq!(knn.predict(&array![[1.0]]).expect("predict"), array![0.0]);
    }

    #[test]
    fn test_cloned_model_keeps_training_rows() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut knn = Knn::new(KnnParams { k: 1 });
        knn.fit(&x, &y).expect("fit");

        let copy = knn.clone();
        let query = array![[0.2], [10.8]];
        assert_eq!(
            copy.predict(&query).expect("predict"),
            knn.predict(&query).expect("predict")
        );
    }
}
