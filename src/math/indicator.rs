use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A trait for incremental indicators.
/// Designed to be object-safe so feature builders can hold `Box<dyn StreamingIndicator>`.
pub trait StreamingIndicator: std::fmt::Debug + Send + Sync {
    /// Update the indicator with the latest scalar value (e.g., close price).
    /// Returns `Some(value)` if the indicator is warm (enough data seen), otherwise `None`.
    fn update(&mut self, value: f64) -> Option<f64>;

    /// Reset the internal state to clear history (e.g., for a new series).
    fn reset(&mut self);
}

// ================================================================================================
// SMA: Simple Moving Average
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSma {
    window_size: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl StreamingSma {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            buffer: VecDeque::with_capacity(window_size),
            sum: 0.0,
        }
    }
}

impl StreamingIndicator for StreamingSma {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        self.sum += value;

        if self.buffer.len() > self.window_size
            && let Some(removed) = self.buffer.pop_front()
        {
            self.sum -= removed;
        }

        if self.buffer.len() >= self.window_size {
            Some(self.sum / self.buffer.len() as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0.0;
    }
}

// ================================================================================================
// STD: Rolling Sample Standard Deviation
// ================================================================================================

/// Trailing sample standard deviation (`ddof = 1`), matching the pandas rolling default.
///
/// The window is recomputed from the buffer on every update (two-pass), which keeps
/// results independent of the history that already left the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingStd {
    window_size: usize,
    buffer: VecDeque<f64>,
}

impl StreamingStd {
    /// Windows below 2 are raised to 2; a sample deviation needs two observations.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(2);
        Self {
            window_size,
            buffer: VecDeque::with_capacity(window_size),
        }
    }
}

impl StreamingIndicator for StreamingStd {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        if self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }

        if self.buffer.len() < self.window_size {
            return None;
        }

        let n = self.buffer.len() as f64;
        let mean = self.buffer.iter().sum::<f64>() / n;
        let ss = self.buffer.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        Some((ss / (n - 1.0)).sqrt())
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

// ================================================================================================
// SHARED: Exponential Weighted Mean (Base Logic)
// ================================================================================================

/// Internal helper for EMA calculations.
/// Implements the recursive formula: $y_t = \alpha * x_t + (1 - \alpha) * y_{t-1}$.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamingEwm {
    alpha: f64,
    current_mean: f64,
    initialized: bool,
    min_periods: usize,
    count: usize,
}

impl StreamingEwm {
    fn new(alpha: f64, min_periods: usize) -> Self {
        Self {
            alpha,
            current_mean: 0.0,
            initialized: false,
            min_periods,
            count: 0,
        }
    }

    fn update(&mut self, value: f64) -> Option<f64> {
        if !self.initialized {
            // Per Pandas `adjust=false`: initialize with the first value
            self.current_mean = value;
            self.initialized = true;
            self.count = 1;
        } else {
            self.current_mean = self.alpha * value + (1.0 - self.alpha) * self.current_mean;
            self.count += 1;
        }

        if self.count >= self.min_periods {
            Some(self.current_mean)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.initialized = false;
        self.current_mean = 0.0;
        self.count = 0;
    }
}

// ================================================================================================
// EMA: Exponential Moving Average
// ================================================================================================

/// Span-parameterised EMA, emitting from the first observation (`adjust=false`, no warm-up).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingEma {
    inner: StreamingEwm,
}

impl StreamingEma {
    pub fn new(span: usize) -> Self {
        // Standard EMA Alpha = 2 / (Span + 1)
        let alpha = 2.0 / (span as f64 + 1.0);
        Self {
            inner: StreamingEwm::new(alpha, 1),
        }
    }
}

impl StreamingIndicator for StreamingEma {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.inner.update(value)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

// ================================================================================================
// MACD: Moving Average Convergence Divergence
// ================================================================================================

/// MACD line, signal and histogram, all warm from the first observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingMacd {
    fast: StreamingEma,
    slow: StreamingEma,
    signal: StreamingEma,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl StreamingMacd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: StreamingEma::new(fast),
            slow: StreamingEma::new(slow),
            signal: StreamingEma::new(signal),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<MacdValue> {
        let line = self.fast.update(value)? - self.slow.update(value)?;
        let signal = self.signal.update(line)?;
        Some(MacdValue {
            line,
            signal,
            histogram: line - signal,
        })
    }

    pub fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
    }
}

impl Default for StreamingMacd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

// ================================================================================================
// RSI: Relative Strength Index
// ================================================================================================

/// RSI over simple rolling means of gains and losses (Cutler's variant).
///
/// Warm once `window_size` price deltas have been observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingRsi {
    prev_price: Option<f64>,
    avg_gain: StreamingSma,
    avg_loss: StreamingSma,
}

impl StreamingRsi {
    pub fn new(window_size: usize) -> Self {
        Self {
            prev_price: None,
            avg_gain: StreamingSma::new(window_size),
            avg_loss: StreamingSma::new(window_size),
        }
    }
}

impl StreamingIndicator for StreamingRsi {
    fn update(&mut self, value: f64) -> Option<f64> {
        let prev = match self.prev_price {
            Some(p) => p,
            None => {
                // First price: no delta yet
                self.prev_price = Some(value);
                return None;
            }
        };

        let delta = value - prev;
        self.prev_price = Some(value);

        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, delta.abs())
        };

        let g_val = self.avg_gain.update(gain);
        let l_val = self.avg_loss.update(loss);

        match (g_val, l_val) {
            (Some(avg_gain), Some(avg_loss)) => {
                if avg_loss == 0.0 {
                    if avg_gain == 0.0 {
                        // Flat line
                        Some(50.0)
                    } else {
                        // Pure gain
                        Some(100.0)
                    }
                } else {
                    let rs = avg_gain / avg_loss;
                    Some(100.0 - (100.0 / (1.0 + rs)))
                }
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.prev_price = None;
        self.avg_gain.reset();
        self.avg_loss.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_sma_warms_after_window() {
        let mut sma = StreamingSma::new(3);
        assert_eq!(sma.update(1.0), None);
        assert_eq!(sma.update(2.0), None);
        assert!((sma.update(3.0).unwrap() - 2.0).abs() < EPS);
        assert!((sma.update(7.0).unwrap() - 4.0).abs() < EPS);

        sma.reset();
        assert_eq!(sma.update(10.0), None);
    }

    #[test]
    fn test_std_matches_sample_deviation() {
        let mut std = StreamingStd::new(3);
        assert_eq!(std.update(2.0), None);
        assert_eq!(std.update(4.0), None);
        // [2, 4, 6] -> mean 4, ss 8, var 4
        assert!((std.update(6.0).unwrap() - 2.0).abs() < EPS);
        // [4, 6, 6] -> mean 16/3
        let expected = (((4.0f64 - 16.0 / 3.0).powi(2) + 2.0 * (6.0f64 - 16.0 / 3.0).powi(2))
            / 2.0)
            .sqrt();
        assert!((std.update(6.0).unwrap() - expected).abs() < EPS);
    }

    #[test]
    fn test_ema_starts_at_first_value() {
        let mut ema = StreamingEma::new(3);
        assert_eq!(ema.update(10.0), Some(10.0));
        // alpha = 0.5
        assert!((ema.update(20.0).unwrap() - 15.0).abs() < EPS);
    }

    #[test]
    fn test_macd_of_constant_series_is_zero() {
        let mut macd = StreamingMacd::default();
        for _ in 0..50 {
            let v = macd.update(100.0).expect("macd is warm from the first value");
            assert!(v.line.abs() < EPS);
            assert!(v.histogram.abs() < EPS);
        }
    }

    #[test]
    fn test_rsi_warmup_and_extremes() {
        let mut rsi = StreamingRsi::new(3);
        assert_eq!(rsi.update(1.0), None);
        assert_eq!(rsi.update(2.0), None);
        assert_eq!(rsi.update(3.0), None);
        assert_eq!(rsi.update(4.0), Some(100.0));

        let mut flat = StreamingRsi::new(2);
        flat.update(5.0);
        flat.update(5.0);
        assert_eq!(flat.update(5.0), Some(50.0));

        let mut mixed = StreamingRsi::new(2);
        mixed.update(10.0);
        mixed.update(12.0); // gain 2
        // loss 1 -> avg gain 1, avg loss 0.5, rs 2
        let v = mixed.update(11.0).unwrap();
        assert!((v - (100.0 - 100.0 / 3.0)).abs() < EPS);
    }
}
