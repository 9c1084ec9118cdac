//! Parameter metadata for sweeps
//!
//! Every tunable knob of the filter and of the exit policies is described by
//! a [`ParamMeta`]: its default, the range to sweep and the step.
//!
//! # Example
//!
//! ```rust
//! use redcandle::params::{Parameterized, RISK_REWARD_RATIO};
//! use redcandle::prelude::*;
//!
//! for param in FilterConfig::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let set = ExitPolicySet::from_grid(None, Some(&RISK_REWARD_RATIO), None);
//! assert_eq!(set.variants().len(), RISK_REWARD_RATIO.generate_grid().len());
//! ```

use std::collections::HashMap;

use crate::detector::FilterConfig;
use crate::{Error, Period, Result, Threshold};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Value in 0.0..=100.0
  Threshold,
  /// Positive integer
  Period,
  /// Finite value above zero
  Positive,
}

/// Metadata for a single tunable parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "rsi_period")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for sweeps: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn threshold(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Threshold, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn positive(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Positive, default, range, description }
  }

  /// All values of the sweep, `min` to `max` inclusive.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|i| min + i as f64 * step).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if !(min..=max).contains(&value) {
      return Err(Error::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Threshold => Threshold::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(Error::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Positive => {
        if value <= 0.0 {
          return Err(Error::InvalidValue("value must be above zero"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// KNOWN PARAMETERS
// ============================================================

pub const RSI_PERIOD: ParamMeta =
  ParamMeta::period("rsi_period", 14.0, (7.0, 21.0, 7.0), "RSI lookback in bars");

pub const RSI_THRESHOLD: ParamMeta = ParamMeta::threshold(
  "rsi_threshold",
  30.0,
  (20.0, 40.0, 5.0),
  "Longs need RSI at or below this, shorts at or above 100 minus it",
);

pub const VOLUME_FACTOR: ParamMeta = ParamMeta::positive(
  "volume_factor",
  1.5,
  (1.0, 3.0, 0.5),
  "Minimum volume relative to its trailing mean",
);

pub const VOLUME_PERIOD: ParamMeta =
  ParamMeta::period("volume_period", 5.0, (3.0, 20.0, 1.0), "Trailing volume window in bars");

pub const PERCENTAGE_TARGET: ParamMeta =
  ParamMeta::positive("percentage_target", 5.0, (1.0, 15.0, 1.0), "Profit target, % from entry");

pub const RISK_REWARD_RATIO: ParamMeta = ParamMeta::positive(
  "risk_reward_ratio",
  2.0,
  (1.0, 3.0, 0.5),
  "Profit target as a multiple of the entry-to-stop distance",
);

pub const DOLLAR_TARGET: ParamMeta =
  ParamMeta::positive("dollar_target", 100.0, (50.0, 500.0, 50.0), "Profit target in dollars");

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Types that can be rebuilt from a flat name/value map
pub trait Parameterized: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Missing parameters keep their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

impl Parameterized for FilterConfig {
  fn param_meta() -> &'static [ParamMeta] {
    const PARAMS: &[ParamMeta] = &[RSI_PERIOD, RSI_THRESHOLD, VOLUME_FACTOR, VOLUME_PERIOD];
    PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let config = Self {
      rsi_period: get_period(params, &RSI_PERIOD)?,
      rsi_threshold: get_threshold(params, &RSI_THRESHOLD)?,
      volume_factor: get_value(params, &VOLUME_FACTOR)?,
      volume_period: get_period(params, &VOLUME_PERIOD)?,
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Supplied value checked against `meta`, or the default
pub fn get_value(params: &HashMap<&str, f64>, meta: &ParamMeta) -> Result<f64> {
  match params.get(meta.name) {
    Some(&value) => {
      meta.validate(value)?;
      Ok(value)
    },
    None => Ok(meta.default),
  }
}

pub fn get_threshold(params: &HashMap<&str, f64>, meta: &ParamMeta) -> Result<Threshold> {
  Threshold::new(get_value(params, meta)?)
}

pub fn get_period(params: &HashMap<&str, f64>, meta: &ParamMeta) -> Result<Period> {
  Period::new(get_value(params, meta)? as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_constructors() {
    assert_eq!(RSI_PERIOD.param_type, ParamType::Period);
    assert_eq!(RSI_THRESHOLD.param_type, ParamType::Threshold);
    assert_eq!(DOLLAR_TARGET.param_type, ParamType::Positive);
    assert_eq!(RSI_PERIOD.default, 14.0);
  }

  #[test]
  fn test_generate_grid() {
    let grid = RISK_REWARD_RATIO.generate_grid();
    assert_eq!(grid, vec![1.0, 1.5, 2.0, 2.5, 3.0]);

    let grid = PERCENTAGE_TARGET.generate_grid();
    assert_eq!(grid.len(), 15);
    assert_eq!(grid[0], 1.0);
    assert_eq!(grid[14], 15.0);
  }

  #[test]
  fn test_grid_without_drift() {
    let meta = ParamMeta::positive("test", 0.3, (0.1, 0.7, 0.1), "Test");
    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 7);
    assert!((grid[6] - 0.7).abs() < 1e-12);
  }

  #[test]
  fn test_defaults_are_in_range() {
    for meta in FilterConfig::param_meta()
      .iter()
      .chain([PERCENTAGE_TARGET, RISK_REWARD_RATIO, DOLLAR_TARGET].iter())
    {
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
  }

  #[test]
  fn test_validate_period() {
    assert!(RSI_PERIOD.validate(14.0).is_ok());
    assert!(RSI_PERIOD.validate(14.5).is_err());
    assert!(matches!(RSI_PERIOD.validate(30.0), Err(Error::OutOfRange { field: "rsi_period", .. })));
  }

  #[test]
  fn test_validate_positive() {
    let meta = ParamMeta::positive("test", 1.0, (0.0, 2.0, 0.5), "Test");
    assert!(meta.validate(0.5).is_ok());
    assert!(meta.validate(0.0).is_err());
  }

  #[test]
  fn test_filter_with_params() {
    let mut params = HashMap::new();
    params.insert("rsi_period", 21.0);
    params.insert("volume_factor", 2.0);

    let config = FilterConfig::with_params(&params).unwrap();
    assert_eq!(config.rsi_period.get(), 21);
    assert_eq!(config.volume_factor, 2.0);
    assert_eq!(config.rsi_threshold.get(), 30.0);
    assert_eq!(config.volume_period.get(), 5);
  }

  #[test]
  fn test_filter_with_empty_params_is_default() {
    let config = FilterConfig::with_params(&HashMap::new()).unwrap();
    assert_eq!(config, FilterConfig::default());
  }

  #[test]
  fn test_filter_rejects_out_of_range() {
    let mut params = HashMap::new();
    params.insert("rsi_threshold", 75.0);
    assert!(FilterConfig::with_params(&params).is_err());
  }
}
