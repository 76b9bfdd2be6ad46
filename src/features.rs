use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    data::clean::CleanedSeries,
    error::{ConfigError, StockcastResult},
    math::indicator::{
        StreamingEma, StreamingIndicator, StreamingMacd, StreamingRsi, StreamingSma, StreamingStd,
    },
};

// ================================================================================================
// Configuration
// ================================================================================================

/// Feature engineering parameters.
///
/// Defaults: `window = 5`, `lags = 3`, technical block off
/// (`ema_short = 5`, `ema_long = 20`, `rsi_period = 14` when enabled).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Closes in the trailing window used by `rolling_mean` and `volatility`.
    pub window: usize,

    /// Number of lagged returns (`lag_return_1..=lags`).
    pub lags: usize,

    /// Adds EMA, RSI, MACD and calendar month features.
    pub technical: bool,

    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi_period: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window: 5,
            lags: 3,
            technical: false,
            ema_short: 5,
            ema_long: 20,
            rsi_period: 14,
        }
    }
}

impl FeatureConfig {
    pub fn with_window(self, window: usize) -> Self {
        Self { window, ..self }
    }

    pub fn with_lags(self, lags: usize) -> Self {
        Self { lags, ..self }
    }

    pub fn with_technical(self, technical: bool) -> Self {
        Self { technical, ..self }
    }

    pub fn validate(&self) -> StockcastResult<()> {
        if self.window < 3 {
            return Err(ConfigError::InvalidWindow(self.window).into());
        }
        for (name, value) in [
            ("ema_short", self.ema_short),
            ("ema_long", self.ema_long),
            ("rsi_period", self.rsi_period),
        ] {
            if self.technical && value == 0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    msg: "must be positive".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Number of leading rows of a series that cannot carry a full feature row.
    ///
    /// The rolling window needs `window - 1` prior closes, lag `i` needs the return
    /// at `t - i`, which itself needs `t - i - 1`, and RSI needs `rsi_period` deltas.
    /// For `window >= lags + 2` this is `max(window, lags) - 1`.
    pub fn warmup_rows(&self) -> usize {
        let base = self.window.saturating_sub(1).max(self.lags + 1);
        if self.technical {
            base.max(self.rsi_period)
        } else {
            base
        }
    }

    /// Names of the numeric feature columns, in the order of [`FeatureRow::numeric_values`].
    pub fn numeric_feature_names(&self) -> Vec<String> {
        let mut names = vec![
            "pct_change".to_string(),
            format!("rolling_mean_{}", self.window),
            format!("volatility_{}", self.window),
        ];
        names.extend((1..=self.lags).map(|i| format!("lag_return_{i}")));
        if self.technical {
            names.extend(
                [
                    "ema_short",
                    "ema_long",
                    "rsi",
                    "macd",
                    "macd_signal",
                    "macd_hist",
                    "month",
                ]
                .map(str::to_string),
            );
        }
        names
    }
}

// ================================================================================================
// Feature Rows
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalFeatures {
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub month: u32,
}

/// Features of one trading day, computed only from closes at or before that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Position of the source record in its [`CleanedSeries`].
    pub position: usize,
    pub date: NaiveDate,
    pub close: f64,
    pub pct_change: f64,
    pub rolling_mean: f64,
    pub volatility: f64,
    pub lag_returns: Vec<f64>,
    /// Monday = 0 .. Sunday = 6.
    pub day_of_week: u32,
    pub technical: Option<TechnicalFeatures>,
}

impl FeatureRow {
    pub fn numeric_values(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(3 + self.lag_returns.len() + 7);
        values.extend([self.pct_change, self.rolling_mean, self.volatility]);
        values.extend_from_slice(&self.lag_returns);
        if let Some(t) = &self.technical {
            values.extend([
                t.ema_short,
                t.ema_long,
                t.rsi,
                t.macd,
                t.macd_signal,
                t.macd_hist,
                f64::from(t.month),
            ]);
        }
        values
    }
}

// ================================================================================================
// Engineering
// ================================================================================================

/// Derives feature rows for every position past the warm-up.
///
/// Pure and deterministic. Returns an empty vector when the series is not longer
/// than the warm-up.
pub fn engineer(series: &CleanedSeries, cfg: &FeatureConfig) -> Vec<FeatureRow> {
    let records = series.records();
    let warmup = cfg.warmup_rows();
    let mut rows = Vec::with_capacity(records.len().saturating_sub(warmup));

    let mut sma = StreamingSma::new(cfg.window);
    let mut volatility = StreamingStd::new(cfg.window.saturating_sub(1));
    let mut ema_short = StreamingEma::new(cfg.ema_short);
    let mut ema_long = StreamingEma::new(cfg.ema_long);
    let mut rsi = StreamingRsi::new(cfg.rsi_period);
    let mut macd = StreamingMacd::default();

    let mut returns: Vec<Option<f64>> = Vec::with_capacity(records.len());

    for (t, record) in records.iter().enumerate() {
        let pct_change = t
            .checked_sub(1)
            .map(|prev| (record.close - records[prev].close) / records[prev].close);
        returns.push(pct_change);

        let rolling_mean = sma.update(record.close);
        let vol = pct_change.and_then(|r| volatility.update(r));

        let technical = if cfg.technical {
            let rsi_value = rsi.update(record.close);
            let macd_value = macd.update(record.close);
            match (
                ema_short.update(record.close),
                ema_long.update(record.close),
                rsi_value,
                macd_value,
            ) {
                (Some(short), Some(long), Some(rsi), Some(m)) => Some(TechnicalFeatures {
                    ema_short: short,
                    ema_long: long,
                    rsi,
                    macd: m.line,
                    macd_signal: m.signal,
                    macd_hist: m.histogram,
                    month: record.date.month(),
                }),
                _ => None,
            }
        } else {
            None
        };

        if t < warmup {
            continue;
        }

        let lag_returns = (1..=cfg.lags)
            .map(|i| returns.get(t - i).copied().flatten())
            .collect::<Option<Vec<f64>>>();

        if let (Some(pct_change), Some(rolling_mean), Some(volatility), Some(lag_returns)) =
            (pct_change, rolling_mean, vol, lag_returns)
            && (technical.is_some() || !cfg.technical)
        {
            rows.push(FeatureRow {
                position: t,
                date: record.date,
                close: record.close,
                pct_change,
                rolling_mean,
                volatility,
                lag_returns,
                day_of_week: record.date.weekday().num_days_from_monday(),
                technical,
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::data::domain::{IndexId, PriceRecord};

    const EPS: f64 = 1e-12;

    fn series(closes: &[f64]) -> CleanedSeries {
        // 2024-01-01 is a Monday.
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

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64).collect()
    }

    #[test]
    fn test_warmup_matches_window_and_lags() {
        for (window, lags) in [(5, 3), (3, 1), (10, 2), (20, 5)] {
            let cfg = FeatureConfig::default().with_window(window).with_lags(lags);
            assert_eq!(cfg.warmup_rows(), window.max(lags) - 1);

            let rows = engineer(&series(&closes(60)), &cfg);
            assert_eq!(rows.len(), 60 - cfg.warmup_rows());
            assert_eq!(rows[0].position, cfg.warmup_rows());
        }
    }

    #[test]
    fn test_warmup_with_many_lags() {
        let cfg = FeatureConfig::default().with_window(3).with_lags(6);
        assert_eq!(cfg.warmup_rows(), 7);
        let rows = engineer(&series(&closes(30)), &cfg);
        assert_eq!(rows[0].position, 7);
        assert_eq!(rows.len(), 23);
    }

    #[test]
    fn test_feature_values() {
        let prices = [100.0, 110.0, 99.0, 99.0, 108.9, 120.0];
        let cfg = FeatureConfig::default().with_window(3).with_lags(2);
        let rows = engineer(&series(&prices), &cfg);

        // warm-up = max(2, 3) = 3
        let first = &rows[0];
        assert_eq!(first.position, 3);
        assert!(first.pct_change.abs() < EPS);
        assert!((first.rolling_mean - (110.0 + 99.0 + 99.0) / 3.0).abs() < EPS);
        // returns in window: -0.1, 0.0
        let expected_vol = (0.005f64).sqrt();
        assert!((first.volatility - expected_vol).abs() < EPS);
        assert!((first.lag_returns[0] - (-0.1)).abs() < EPS);
        assert!((first.lag_returns[1] - 0.1).abs() < EPS);
        // 2024-01-04 is a Thursday
        assert_eq!(first.day_of_week, 3);
        assert!(first.technical.is_none());
        assert_eq!(first.numeric_values().len(), cfg.numeric_feature_names().len());
    }

    #[test]
    fn test_features_never_look_ahead() {
        let cfg = FeatureConfig::default();
        let base = closes(40);
        let full = engineer(&series(&base), &cfg);

        let mut changed = base.clone();
        changed[30] *= 3.0;
        let perturbed = engineer(&series(&changed), &cfg);

        for (a, b) in full.iter().zip(&perturbed) {
            if a.position < 30 {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_technical_block() {
        let cfg = FeatureConfig::default().with_technical(true);
        assert_eq!(cfg.warmup_rows(), 14);

        let rows = engineer(&series(&closes(50)), &cfg);
        assert_eq!(rows.len(), 50 - 14);
        let tech = rows[0].technical.expect("technical features present");
        assert!((0.0..=100.0).contains(&tech.rsi));
        assert_eq!(tech.month, 1);
        assert!((tech.macd_hist - (tech.macd - tech.macd_signal)).abs() < EPS);
        assert_eq!(
            rows[0].numeric_values().len(),
            cfg.numeric_feature_names().len()
        );
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let rows = engineer(&series(&[1.0, 2.0, 3.0]), &FeatureConfig::default());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_window_validation() {
        assert!(FeatureConfig::default().with_window(2).validate().is_err());
        assert!(FeatureConfig::default().with_window(0).validate().is_err());
        assert!(FeatureConfig::default().validate().is_ok());
    }
}
