use ndarray::{Array1, Array2, ArrayView1};
use ordered_float::OrderedFloat;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, StockcastResult},
    model::{Classifier, ModelKind, check_features, threshold, validate_training_data},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shrinkage applied to every tree's leaf weights.
    pub learning_rate: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// Fraction of rows sampled (without replacement) per tree.
    pub subsample: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1.0,
            subsample: 1.0,
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> StockcastResult<()> {
        let ok = self.n_estimators > 0
            && self.max_depth > 0
            && self.learning_rate > 0.0
            && self.lambda >= 0.0
            && self.min_child_weight >= 0.0
            && self.subsample > 0.0
            && self.subsample <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ModelError::InvalidHyperparameter(format!("{self:?}")).into())
        }
    }
}

// ================================================================================================
// Regression Tree
// ================================================================================================

#[derive(Debug, Clone)]
enum BoostNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
}

impl BoostNode {
    fn weight(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                BoostNode::Leaf(w) => return *w,
                BoostNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Grows one tree on gradients `g` and hessians `h` of the logistic loss.
struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    g: &'a [f64],
    h: &'a [f64],
    params: &'a BoostingParams,
}

impl TreeGrower<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn grow(&self, indices: &[usize], depth: usize) -> BoostNode {
        let g_sum = indices.iter().map(|&i| self.g[i]).sum::<f64>();
        let h_sum = indices.iter().map(|&i| self.h[i]).sum::<f64>();
        let leaf = BoostNode::Leaf(-g_sum / (h_sum + self.params.lambda));

        if depth >= self.params.max_depth || indices.len() < 2 {
            return leaf;
        }

        let parent_score = self.score(g_sum, h_sum);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..self.x.ncols() {
            sorted.sort_by_key(|&i| (OrderedFloat(self.x[[i, feature]]), i));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pos in 1..sorted.len() {
                let prev = sorted[pos - 1];
                g_left += self.g[prev];
                h_left += self.h[prev];

                let (lo, hi) = (self.x[[prev, feature]], self.x[[sorted[pos], feature]]);
                let h_right = h_sum - h_left;
                if lo == hi
                    || h_left < self.params.min_child_weight
                    || h_right < self.params.min_child_weight
                {
                    continue;
                }

                let gain = 0.5
                    * (self.score(g_left, h_left) + self.score(g_sum - g_left, h_right)
                        - parent_score);
                if gain > 1e-12 && best.is_none_or(|(_, _, b)| gain > b) {
                    best = Some((feature, lo + (hi - lo) / 2.0, gain));
                }
            }
        }

        let Some((feature, threshold, _)) = best else {
            return leaf;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, feature]] <= threshold);

        BoostNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(&left, depth + 1)),
            right: Box::new(self.grow(&right, depth + 1)),
        }
    }
}

// ================================================================================================
// Booster
// ================================================================================================

#[derive(Debug, Clone)]
struct BoostFit {
    n_features: usize,
    trees: Vec<BoostNode>,
}

/// Gradient boosted trees on the logistic loss with Newton leaf weights
/// `-sum(g) / (sum(h) + lambda)` and the matching split gain.
///
/// The initial margin is zero (probability 0.5).
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    params: BoostingParams,
    seed: u64,
    fit: Option<BoostFit>,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            fit: None,
        }
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    fn margin(&self, fit: &BoostFit, row: ArrayView1<f64>) -> f64 {
        fit.trees
            .iter()
            .map(|t| self.params.learning_rate * t.weight(row))
            .sum()
    }

    pub fn n_trees(&self) -> usize {
        self.fit.as_ref().map_or(0, |f| f.trees.len())
    }
}

impl Classifier for GradientBoosting {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
        validate_training_data(x, y)?;
        self.params.validate()?;

        let n = x.nrows();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);

        let mut margins = vec![0.0; n];
        let mut g = vec![0.0; n];
        let mut h = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            for i in 0..n {
                let p = Self::sigmoid(margins[i]);
                g[i] = p - y[i];
                h[i] = p * (1.0 - p);
            }

            let mut rows = if sample_size < n {
                rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };
            rows.sort_unstable();

            let tree = TreeGrower {
                x,
                g: &g,
                h: &h,
                params: &self.params,
            }
            .grow(&rows, 0);

            for (i, margin) in margins.iter_mut().enumerate() {
                *margin += self.params.learning_rate * tree.weight(x.row(i));
            }
            trees.push(tree);
        }

        self.fit = Some(BoostFit {
            n_features: x.ncols(),
            trees,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>> {
        let proba = self
            .predict_probability(x)?
            .ok_or(ModelError::NotFitted)?;
        Ok(threshold(&proba))
    }

    fn predict_probability(&self, x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x, fit.n_features)?;
        Ok(Some(
            x.rows()
                .into_iter()
                .map(|row| Self::sigmoid(self.margin(fit, row)))
                .collect(),
        ))
    }
}
