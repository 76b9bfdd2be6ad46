use std::ops::Range;

use ndarray::{Array1, Array2, Axis, s};

use crate::{
    error::StockcastResult, features::FeatureConfig, labels::LabeledExample,
    model::check_features,
};

/// Weekday dummies, Monday dropped as the reference level.
const WEEKDAY_DUMMIES: [(&str, u32); 4] = [
    ("day_of_week_tue", 1),
    ("day_of_week_wed", 2),
    ("day_of_week_thu", 3),
    ("day_of_week_fri", 4),
];

// ================================================================================================
// Design Matrix
// ================================================================================================

/// Row-aligned features and labels of one labeled series, in date order.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl DesignMatrix {
    /// Numeric features followed by one-hot weekday columns.
    ///
    /// Weekend dates (if any) encode as all zeros, like Monday.
    pub fn from_examples(examples: &[LabeledExample], cfg: &FeatureConfig) -> Self {
        let mut feature_names = cfg.numeric_feature_names();
        let n_numeric = feature_names.len();
        feature_names.extend(WEEKDAY_DUMMIES.iter().map(|(name, _)| name.to_string()));

        let mut x = Array2::zeros((examples.len(), feature_names.len()));
        for (i, example) in examples.iter().enumerate() {
            let mut row = x.row_mut(i);
            for (j, v) in example.features.numeric_values().into_iter().enumerate() {
                row[j] = v;
            }
            for (j, (_, day)) in WEEKDAY_DUMMIES.iter().enumerate() {
                if example.features.day_of_week == *day {
                    row[n_numeric + j] = 1.0;
                }
            }
        }

        let y = examples.iter().map(|e| e.target.as_label()).collect();

        Self {
            x,
            y,
            feature_names,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    /// Owned copy of a contiguous row block.
    pub fn rows(&self, range: Range<usize>) -> (Array2<f64>, Array1<f64>) {
        (
            self.x.slice(s![range.clone(), ..]).to_owned(),
            self.y.slice(s![range]).to_owned(),
        )
    }
}

// ================================================================================================
// Standard Scaler
// ================================================================================================

/// Column-wise standardization fit on training rows only.
///
/// Uses the population standard deviation; constant columns get a scale of `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: Array1::zeros(n_cols),
                scale: Array1::ones(n_cols),
            };
        }

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_cols));
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| {
            if s.is_finite() && s > f64::EPSILON {
                s
            } else {
                1.0
            }
        });
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> StockcastResult<Array2<f64>> {
        check_features(x, self.mean.len())?;
        Ok((x - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ndarray::array;

    use super::*;
    use crate::{data::domain::Direction, features::FeatureRow};

    fn example(day: u32, date: NaiveDate, target: Direction) -> LabeledExample {
        LabeledExample {
            features: FeatureRow {
                position: 0,
                date,
                close: 100.0,
                pct_change: 0.01,
                rolling_mean: 99.0,
                volatility: 0.02,
                lag_returns: vec![0.1, 0.2, 0.3],
                day_of_week: day,
                technical: None,
            },
            target,
            future_return: 0.0,
        }
    }

    #[test]
    fn test_weekday_one_hot_drops_monday() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let examples = vec![
            example(0, date, Direction::Up),
            example(2, date, Direction::Down),
            example(4, date, Direction::Up),
        ];
        let dm = DesignMatrix::from_examples(&examples, &FeatureConfig::default());

        assert_eq!(dm.feature_names.len(), 6 + 4);
        assert_eq!(dm.feature_names[6], "day_of_week_tue");
        assert_eq!(dm.x.row(0).slice(s![6..]).sum(), 0.0);
        assert_eq!(dm.x[[1, 7]], 1.0);
        assert_eq!(dm.x[[2, 9]], 1.0);
        assert_eq!(dm.x[[1, 3]], 0.1);
        assert_eq!(dm.y, array![1.0, 0.0, 1.0]);

        let (x, y) = dm.rows(1..3);
        assert_eq!(x.nrows(), 2);
        assert_eq!(y, array![0.0, 1.0]);
    }

    #[test]
    fn test_scaler_uses_training_statistics() {
        let train = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&train);

        let scaled = scaler.transform(&train).expect("same width");
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);

        // Unseen rows reuse the training mean and scale.
        let test = array![[5.0, 7.0]];
        let scaled = scaler.transform(&test).expect("same width");
        assert_eq!(scaled, array![[3.0, 2.0]]);

        assert!(scaler.transform(&array![[1.0]]).is_err());
        assert_eq!(scaler.clone(), scaler);
    }
}
