use ndarray::Array1;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs.
const LOG_LOSS_EPS: f64 = 1e-15;

/// Number of equal-width bins in a reliability table.
pub const RELIABILITY_BINS: usize = 10;

// ================================================================================================
// Confusion Matrix
// ================================================================================================

/// Binary confusion counts with `Up` (1.0) as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t >= 0.5, p >= 0.5) {
                (true, true) => cm.true_positive += 1,
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// `0.0` when nothing was predicted `Up`.
    pub fn precision(&self) -> f64 {
        ratio(
            self.true_positive,
            self.true_positive + self.false_positive,
        )
    }

    /// `0.0` when there are no `Up` labels.
    pub fn recall(&self) -> f64 {
        ratio(
            self.true_positive,
            self.true_positive + self.false_negative,
        )
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ================================================================================================
// Classification Metrics
// ================================================================================================

/// Metrics of one model on one split of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub n_samples: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` without probabilities or when only one class is present.
    pub roc_auc: Option<f64>,
    pub log_loss: Option<f64>,
    pub brier_score: Option<f64>,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    pub fn calculate(
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        y_proba: Option<&Array1<f64>>,
    ) -> Self {
        let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);
        Self {
            n_samples: y_true.len(),
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            roc_auc: y_proba.and_then(|p| roc_auc(y_true, p)),
            log_loss: y_proba.and_then(|p| log_loss(y_true, p)),
            brier_score: y_proba.and_then(|p| brier_score(y_true, p)),
            confusion,
        }
    }
}

/// Area under the ROC curve via the Mann-Whitney U statistic with average ranks for ties.
///
/// `None` when either class is absent.
pub fn roc_auc(y_true: &Array1<f64>, y_proba: &Array1<f64>) -> Option<f64> {
    let mut pairs = y_proba
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| (OrderedFloat(p), t >= 0.5))
        .collect::<Vec<_>>();
    let n_pos = pairs.iter().filter(|(_, t)| *t).count();
    let n_neg = pairs.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    pairs.sort_by_key(|(p, _)| *p);

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied scores share the mean rank of their group.
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let positives = pairs[i..j].iter().filter(|(_, t)| *t).count();
        rank_sum_pos += avg_rank * positives as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

pub fn log_loss(y_true: &Array1<f64>, y_proba: &Array1<f64>) -> Option<f64> {
    if y_true.is_empty() {
        return None;
    }
    let total = y_true
        .iter()
        .zip(y_proba.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if t >= 0.5 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum::<f64>();
    Some(total / y_true.len() as f64)
}

pub fn brier_score(y_true: &Array1<f64>, y_proba: &Array1<f64>) -> Option<f64> {
    if y_true.is_empty() {
        return None;
    }
    let total = y_true
        .iter()
        .zip(y_proba.iter())
        .map(|(&t, &p)| (p - t).powi(2))
        .sum::<f64>();
    Some(total / y_true.len() as f64)
}

// ================================================================================================
// Reliability
// ================================================================================================

/// One bin of a reliability (calibration) table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// `None` for empty bins.
    pub mean_predicted: Option<f64>,
    pub observed_frequency: Option<f64>,
}

/// Equal-width bins over `[0, 1]`; a probability of exactly `1.0` falls into the last bin.
pub fn reliability_table(
    y_true: &Array1<f64>,
    y_proba: &Array1<f64>,
    bins: usize,
) -> Vec<ReliabilityBin> {
    let bins = bins.max(1);
    let mut sums = vec![(0usize, 0.0f64, 0.0f64); bins];

    for (&t, &p) in y_true.iter().zip(y_proba.iter()) {
        if !p.is_finite() {
            continue;
        }
        let p = p.clamp(0.0, 1.0);
        let bin = ((p * bins as f64) as usize).min(bins - 1);
        let entry = &mut sums[bin];
        entry.0 += 1;
        entry.1 += p;
        entry.2 += t;
    }

    sums.into_iter()
        .enumerate()
        .map(|(i, (count, p_sum, t_sum))| {
            let n = count as f64;
            ReliabilityBin {
                lower: i as f64 / bins as f64,
                upper: (i + 1) as f64 / bins as f64,
                count,
                mean_predicted: (count > 0).then(|| p_sum / n),
                observed_frequency: (count > 0).then(|| t_sum / n),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_confusion_and_scores() {
        let y_true = array![1.0, 1.0, 0.0, 0.0, 1.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 1.0];
        let m = ClassificationMetrics::calculate(&y_true, &y_pred, None);

        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                true_positive: 2,
                true_negative: 1,
                false_positive: 1,
                false_negative: 1,
            }
        );
        assert!((m.accuracy - 0.6).abs() < EPS);
        assert!((m.precision - 2.0 / 3.0).abs() < EPS);
        assert!((m.recall - 2.0 / 3.0).abs() < EPS);
        assert!((m.f1 - 2.0 / 3.0).abs() < EPS);
        assert_eq!(m.roc_auc, None);
        assert_eq!(m.log_loss, None);
    }

    #[test]
    fn test_zero_denominators_are_zero() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 0.0];
        let m = ClassificationMetrics::calculate(&y_true, &y_pred, None);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_roc_auc_perfect_and_ties() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&y, &array![0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &array![0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(roc_auc(&y, &array![0.5, 0.5, 0.5, 0.5]), Some(0.5));
        // one of four pairs inverted
        let auc = roc_auc(&y, &array![0.1, 0.6, 0.5, 0.9]).expect("both classes");
        assert!((auc - 0.75).abs() < EPS);
    }

    #[test]
    fn test_roc_auc_single_class_is_none() {
        let y = array![1.0, 1.0, 1.0];
        let p = array![0.2, 0.5, 0.9];
        assert_eq!(roc_auc(&y, &p), None);

        let m = ClassificationMetrics::calculate(&y, &array![1.0, 1.0, 1.0], Some(&p));
        assert_eq!(m.roc_auc, None);
        assert!(m.log_loss.is_some());
    }

    #[test]
    fn test_log_loss_and_brier() {
        let y = array![1.0, 0.0];
        let p = array![0.8, 0.4];
        let expected = -(0.8f64.ln() + 0.6f64.ln()) / 2.0;
        assert!((log_loss(&y, &p).unwrap() - expected).abs() < EPS);
        assert!((brier_score(&y, &p).unwrap() - (0.04 + 0.16) / 2.0).abs() < EPS);

        // clipping keeps certainty finite
        let certain = log_loss(&array![1.0], &array![0.0]).unwrap();
        assert!(certain.is_finite());
    }

    #[test]
    fn test_reliability_table() {
        let y = array![0.0, 1.0, 1.0, 1.0];
        let p = array![0.05, 0.55, 0.58, 1.0];
        let table = reliability_table(&y, &p, RELIABILITY_BINS);

        assert_eq!(table.len(), 10);
        assert_eq!(table[0].count, 1);
        assert_eq!(table[5].count, 2);
        assert_eq!(table[9].count, 1);
        assert_eq!(table[3].mean_predicted, None);
        assert!((table[5].mean_predicted.unwrap() - 0.565).abs() < EPS);
        assert_eq!(table[5].observed_frequency, Some(1.0));
        assert_eq!(table.iter().map(|b| b.count).sum::<usize>(), 4);
    }
}
