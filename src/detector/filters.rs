//! Momentum and volume confirmation filters
//!
//! Both series are computed over the whole bar series (not per session) and
//! hold `NaN` wherever the lookback is not yet filled. A `NaN` reading never
//! passes a filter.

use crate::{Direction, Error, Period, Result, Threshold};

/// Optional confirmation mask applied after detection.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub rsi_period: Period,
    /// Longs need RSI at or below this; shorts need RSI at or above its complement.
    pub rsi_threshold: Threshold,
    /// Minimum volume / trailing average volume
    pub volume_factor: f64,
    pub volume_period: Period,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rsi_period: Period::new_const(14),
            rsi_threshold: Threshold::new_const(30.0),
            volume_factor: 1.5,
            volume_period: Period::new_const(5),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.volume_factor.is_finite() || self.volume_factor < 0.0 {
            return Err(Error::Configuration(format!(
                "volume_factor must be a finite non-negative number, got {}",
                self.volume_factor
            )));
        }
        Ok(())
    }

    /// Whether an entry in `direction` survives the filter.
    pub fn passes(&self, direction: Direction, rsi: f64, volume_ratio: f64) -> bool {
        let momentum_ok = match direction {
            Direction::Long => rsi <= self.rsi_threshold.get(),
            Direction::Short => rsi >= self.rsi_threshold.complement(),
        };
        momentum_ok && volume_ratio >= self.volume_factor
    }
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value (at `period`) seeds the averages with a simple mean of the
/// first `period` changes; every later value uses
/// `avg = (avg * (period - 1) + x) / period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = changes.iter().map(|&c| c.max(0.0)).collect();
    let losses: Vec<f64> = changes.iter().map(|&c| (-c).max(0.0)).collect();

    let p = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / p;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / p;
    result[period] = rsi_value(avg_gain, avg_loss);

    for i in period..changes.len() {
        avg_gain = (avg_gain * (p - 1.0) + gains[i]) / p;
        avg_loss = (avg_loss * (p - 1.0) + losses[i]) / p;
        result[i + 1] = rsi_value(avg_gain, avg_loss);
    }

    result
}

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss != 0.0 {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    } else if avg_gain != 0.0 {
        100.0
    } else {
        50.0
    }
}

/// Volume divided by the mean volume of the trailing `period` bars,
/// the current bar included.
pub fn volume_ratio(volumes: &[f64], period: usize) -> Vec<f64> {
    let n = volumes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut window_sum: f64 = volumes[..period].iter().sum();
    for i in (period - 1)..n {
        if i >= period {
            window_sum += volumes[i] - volumes[i - period];
        }
        let mean = window_sum / period as f64;
        // an all-zero window has no baseline
        if mean > 0.0 {
            result[i] = volumes[i] / mean;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_warmup_is_nan() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let values = rsi(&closes, 14);
        assert!(values[..14].iter().all(|v| v.is_nan()));
        assert!(!values[14].is_nan());
    }

    #[test]
    fn rsi_pure_uptrend_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let values = rsi(&closes, 14);
        assert_eq!(values[19], 100.0);
    }

    #[test]
    fn rsi_flat_is_50() {
        let closes = vec![100.0; 20];
        let values = rsi(&closes, 14);
        assert_eq!(values[15], 50.0);
    }

    #[test]
    fn rsi_wilder_smoothing() {
        // period 2: changes +1, -1, +1
        let closes = [10.0, 11.0, 10.0, 11.0];
        let values = rsi(&closes, 2);
        // seed: gain 0.5, loss 0.5 -> 50
        assert!((values[2] - 50.0).abs() < 1e-12);
        // gain (0.5 + 1)/2 = 0.75, loss (0.5 + 0)/2 = 0.25 -> 75
        assert!((values[3] - 75.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_short_series() {
        assert!(rsi(&[1.0, 2.0], 14).iter().all(|v| v.is_nan()));
        assert!(rsi(&[], 14).is_empty());
    }

    #[test]
    fn volume_ratio_includes_current_bar() {
        let volumes = [100.0, 100.0, 100.0, 100.0, 600.0, 100.0];
        let values = volume_ratio(&volumes, 5);
        assert!(values[..4].iter().all(|v| v.is_nan()));
        // mean of 100,100,100,100,600 = 200
        assert!((values[4] - 3.0).abs() < 1e-12);
        // mean of 100,100,100,600,100 = 200
        assert!((values[5] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_volume_window_has_no_ratio() {
        let volumes = [0.0, 0.0, 0.0, 0.0, 0.0, 500.0];
        let values = volume_ratio(&volumes, 5);
        assert!(values[4].is_nan());
        // mean of 0,0,0,0,500 = 100
        assert!((values[5] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn filter_thresholds() {
        let filter = FilterConfig::default();
        assert!(filter.passes(Direction::Long, 30.0, 1.5));
        assert!(!filter.passes(Direction::Long, 30.1, 2.0));
        assert!(!filter.passes(Direction::Long, 20.0, 1.4));
        assert!(filter.passes(Direction::Short, 70.0, 1.5));
        assert!(!filter.passes(Direction::Short, 69.9, 3.0));
    }

    #[test]
    fn nan_never_passes() {
        let filter = FilterConfig::default();
        assert!(!filter.passes(Direction::Long, f64::NAN, 5.0));
        assert!(!filter.passes(Direction::Short, 90.0, f64::NAN));
    }

    #[test]
    fn rejects_negative_volume_factor() {
        let filter = FilterConfig {
            volume_factor: -1.0,
            ..FilterConfig::default()
        };
        assert!(filter.validate().is_err());
    }
}
