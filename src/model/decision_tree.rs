use ndarray::{Array1, Array2, ArrayView1};
use ordered_float::OrderedFloat;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, StockcastResult},
    model::{Classifier, ModelKind, check_features, threshold, validate_training_data},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        /// Fraction of `Up` labels among the training rows in this leaf.
        probability: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn probability(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { probability, .. } => return *probability,
                TreeNode::Split {
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

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// CART classification tree with Gini impurity.
///
/// Features are scanned in a seeded random order; among equal gains the first
/// feature scanned wins, so the seed only breaks ties.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    params: TreeParams,
    seed: u64,
    n_features: usize,
    root: Option<TreeNode>,
}

impl DecisionTree {
    pub fn new(params: TreeParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            n_features: 0,
            root: None,
        }
    }

    pub fn depth(&self) -> Option<usize> {
        self.root.as_ref().map(TreeNode::depth)
    }

    fn gini(ups: f64, n: f64) -> f64 {
        if n == 0.0 {
            return 0.0;
        }
        let p = ups / n;
        2.0 * p * (1.0 - p)
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> TreeNode {
        let n = indices.len();
        let ups = indices.iter().map(|&i| y[i]).sum::<f64>();
        let impurity = Self::gini(ups, n as f64);

        let leaf = TreeNode::Leaf {
            probability: ups / n as f64,
            n_samples: n,
        };
        if depth >= self.params.max_depth
            || n < self.params.min_samples_split
            || impurity == 0.0
        {
            return leaf;
        }

        let Some(best) = self.best_split(x, y, indices, impurity, rng) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature]] <= best.threshold);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(x, y, &left, depth + 1, rng)),
            right: Box::new(self.build(x, y, &right, depth + 1, rng)),
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        impurity: f64,
        rng: &mut StdRng,
    ) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total_ups = indices.iter().map(|&i| y[i]).sum::<f64>();

        let mut features = (0..x.ncols()).collect::<Vec<_>>();
        features.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in features {
            sorted.sort_by_key(|&i| (OrderedFloat(x[[i, feature]]), i));

            let mut left_ups = 0.0;
            for pos in 1..n {
                left_ups += y[sorted[pos - 1]];
                let (lo, hi) = (x[[sorted[pos - 1], feature]], x[[sorted[pos], feature]]);
                if pos < min_leaf || n - pos < min_leaf || lo == hi {
                    continue;
                }

                let (n_left, n_right) = (pos as f64, (n - pos) as f64);
                let weighted = (n_left * Self::gini(left_ups, n_left)
                    + n_right * Self::gini(total_ups - left_ups, n_right))
                    / n as f64;
                let gain = impurity - weighted;

                if gain > 1e-12 && best.is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn fitted(&self) -> StockcastResult<&TreeNode> {
        self.root.as_ref().ok_or_else(|| ModelError::NotFitted.into())
    }
}

impl Classifier for DecisionTree {
    fn kind(&self) -> ModelKind {
        ModelKind::DecisionTree
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> StockcastResult<()> {
        validate_training_data(x, y)?;
        if self.params.max_depth == 0 {
            return Err(
                ModelError::InvalidHyperparameter("max_depth must be positive".to_string()).into(),
            );
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices = (0..x.nrows()).collect::<Vec<_>>();
        self.n_features = x.ncols();
        self.root = Some(self.build(x, y, &indices, 0, &mut rng));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> StockcastResult<Array1<f64>> {
        let proba = self
            .predict_probability(x)?
            .ok_or(ModelError::NotFitted)?;
        Ok(threshold(&proba))
    }

    fn predict_probability(&self, x: &Array2<f64>) -> StockcastResult<Option<Array1<f64>>> {
        let root = self.fitted()?;
        check_features(x, self.n_features)?;
        Ok(Some(
            x.rows().into_iter().map(|row| root.probability(row)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_learns_xor_with_depth_two() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];

        // Greedy CART sees no first-level gain on XOR, so add a tie-breaking row.
        let x = ndarray::concatenate![ndarray::Axis(0), x, array![[0.0, 0.0]]];
        let y = ndarray::concatenate![ndarray::Axis(0), y, array![0.0]];

        let mut tree = DecisionTree::new(TreeParams::default(), 1);
        tree.fit(&x, &y).expect("fit");
        let pred = tree.predict(&x).expect("predict");
        assert_eq!(pred, y);
    }

    #[test]
    fn test_max_depth_is_respected() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(64, |i| ((i / 4) % 2) as f64);

        for max_depth in [1, 2, 3] {
            let mut tree = DecisionTree::new(
                TreeParams {
                    max_depth,
                    ..Default::default()
                },
                0,
            );
            tree.fit(&x, &y).expect("fit");
            assert!(tree.depth().expect("fitted") <= max_depth);
        }
    }

    #[test]
    fn test_same_seed_same_tree() {
        let x = Array2::from_shape_fn((50, 3), |(i, j)| ((i * (j + 3)) % 11) as f64);
        let y = Array1::from_shape_fn(50, |i| (i % 3 == 0) as u8 as f64);

        let fit = |seed| {
            let mut t = DecisionTree::new(TreeParams::default(), seed);
            t.fit(&x, &y).expect("fit");
            t.predict_probability(&x).expect("proba").expect("some")
        };
        assert_eq!(fit(9), fit(9));
    }
}
