//! TOML strategy configuration
//!
//! ```toml
//! [detector]
//! utc_offset_minutes = -300
//! use_filters = true
//!
//! [detector.filter]
//! rsi_period = 14
//! rsi_threshold = 30
//!
//! [backtest]
//! commission_pct = 0.05
//! contracts = 2
//!
//! [backtest.policies]
//! risk_reward = [1.5, 2.0, 3.0]
//! ```
//!
//! Every table and key is optional; missing ones take their defaults.

use std::path::Path;

use crate::backtest::BacktestConfig;
use crate::detector::DetectorConfig;
use crate::{Error, Result};

/// Detector plus backtest settings for one strategy run
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub detector: DetectorConfig,
    pub backtest: BacktestConfig,
}

impl StrategyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Parse(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        self.backtest.validate()
    }
}
