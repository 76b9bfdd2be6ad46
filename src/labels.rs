use serde::{Deserialize, Serialize};

use crate::{data::clean::CleanedSeries, data::domain::Direction, features::FeatureRow};

/// A feature row paired with the direction of the following close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub features: FeatureRow,
    pub target: Direction,
    /// Fractional return from this close to the next one.
    pub future_return: f64,
}

/// Attaches next-day labels. The row for the last record of the series has no
/// successor and is dropped.
pub fn label(series: &CleanedSeries, rows: Vec<FeatureRow>) -> Vec<LabeledExample> {
    rows.into_iter()
        .filter_map(|features| {
            let next = series.close(features.position + 1)?;
            let current = features.close;
            Some(LabeledExample {
                target: Direction::from_change(current, next),
                future_return: (next - current) / current,
                features,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::{
        data::domain::{IndexId, PriceRecord},
        features::FeatureConfig,
    };

    fn series(closes: &[f64]) -> CleanedSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let index = IndexId::new("TEST");
        let records = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceRecord {
                index: index.clone(),
                date: start + Duration::days(i as i64),
                open: close,
                high: None,
                low: None,
                close,
                volume: None,
            })
            .collect();
        CleanedSeries::new(index, records).expect("valid series")
    }

    fn bare_row(position: usize, close: f64) -> FeatureRow {
        FeatureRow {
            position,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(position as i64),
            close,
            pct_change: 0.0,
            rolling_mean: close,
            volatility: 0.0,
            lag_returns: Vec::new(),
            day_of_week: 0,
            technical: None,
        }
    }

    #[test]
    fn test_labels_follow_next_close() {
        let closes = [100.0, 105.0, 103.0, 103.0];
        let s = series(&closes);
        let rows = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| bare_row(i, c))
            .collect();

        let labeled = label(&s, rows);
        let targets = labeled.iter().map(|e| e.target).collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec![Direction::Up, Direction::Down, Direction::Down]
        );
        assert!((labeled[0].future_return - 0.05).abs() < 1e-12);
        assert_eq!(labeled[2].future_return, 0.0);
    }

    #[test]
    fn test_last_row_is_excluded() {
        let closes = (0..20).map(|i| 100.0 + i as f64).collect::<Vec<_>>();
        let s = series(&closes);
        let rows = crate::features::engineer(&s, &FeatureConfig::default());
        let n_rows = rows.len();
        let last_position = rows.last().map(|r| r.position);

        let labeled = label(&s, rows);
        assert_eq!(labeled.len(), n_rows - 1);
        assert_eq!(last_position, Some(19));
        assert!(labeled.iter().all(|e| e.features.position < 19));
        assert!(labeled.iter().all(|e| e.target == Direction::Up));
    }
}
