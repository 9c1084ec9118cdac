//! # redcandle - Red Candle Theory signal detection and backtesting
//!
//! Intraday entry detection over OHLCV bars plus a deterministic
//! stop/target backtest for the detected entries.
//!
//! ## Quick Start
//!
//! ```rust
//! use redcandle::prelude::*;
//!
//! // Timestamps are Unix epoch milliseconds.
//! let bars = vec![
//!     Bar::new(1_700_000_000_000, 10.0, 10.6, 9.9, 10.5, 1000.0),
//!     Bar::new(1_700_000_300_000, 10.4, 10.4, 10.0, 10.1, 1000.0),
//!     Bar::new(1_700_000_600_000, 10.1, 10.6, 10.1, 10.6, 1000.0),
//!     Bar::new(1_700_000_900_000, 10.6, 10.9, 10.5, 10.8, 1000.0),
//! ];
//!
//! let detector = SignalDetector::new(DetectorConfig::default()).unwrap();
//! let frame = detector.detect(&bars).unwrap();
//! assert_eq!(frame.signals().count(), 1);
//!
//! let backtester = Backtester::new(BacktestConfig::default()).unwrap();
//! let runs = backtester.run_all(&frame).unwrap();
//! assert_eq!(runs.len(), 3); // default 5%, 10%, 15% targets
//! ```

pub mod backtest;
pub mod config;
pub mod detector;
pub mod params;
pub mod report;
pub mod session;

pub mod prelude {
    pub use crate::{
        // Backtest
        backtest::{
            BacktestConfig, Backtester, CostModel, EntryEvent, ExitPolicy, ExitPolicySet,
            ExitReason, ProfitFactor, ResultsAggregate, Trade, VariantRun,
        },
        // Configuration
        config::StrategyConfig,
        // Detection
        detector::{
            BarAnnotation, DetectorConfig, FilterConfig, SessionPhase, SignalDetector,
            SignalFrame,
        },
        // Reporting
        report::SummaryStats,
        // Parallel
        scan_parallel,
        // Types
        Bar,
        Direction,
        // Errors
        Error,
        OHLCVExt,
        Period,
        Result,
        ScanError,
        ScanResult,
        SignalEvent,
        Threshold,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by detection, backtesting and configuration.
///
/// "No signals found" and "trade still open" are ordinary results and never
/// appear here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Malformed input at bar {index}: {reason}")]
    MalformedInput { index: usize, reason: &'static str },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Export failed: {0}")]
    Export(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Oscillator level in range 0.0..=100.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    /// Create a new Threshold, validating the value is in [0.0, 100.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(Error::InvalidValue("Threshold cannot be NaN or infinite"));
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(Error::OutOfRange {
                field: "Threshold",
                value,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Mirror level on the other side of 50 (30 -> 70).
    #[inline]
    pub fn complement(self) -> f64 {
        100.0 - self.0
    }
}

impl serde::Serialize for Threshold {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Threshold {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Threshold::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
///
/// Detection groups bars by the calendar date of `timestamp()` (Unix epoch
/// milliseconds), so a bar type that cannot supply one is rejected as
/// malformed input.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// A "red" candle.
    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Validate OHLC consistency. The reported index is 0; series-level
    /// validation rewrites it to the bar's position.
    fn validate(&self) -> Result<()> {
        if self.open().is_nan() || self.high().is_nan() || self.low().is_nan() || self.close().is_nan()
        {
            return Err(Error::MalformedInput {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(Error::MalformedInput {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(Error::MalformedInput {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// BAR
// ============================================================

/// Plain OHLCV bar as handed over by a bar source.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// SIGNALS
// ============================================================

/// Trade direction of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Direction::Long)
    }

    #[inline]
    pub fn is_short(self) -> bool {
        matches!(self, Direction::Short)
    }

    /// +1.0 for long, -1.0 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry event emitted by the detector - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalEvent {
    /// Position of the entry bar in the scanned series
    pub index: usize,
    pub timestamp: i64,
    pub direction: Direction,
    /// Close of the entry bar
    pub entry_price: f64,
    /// Opposite extreme of the breakout candle
    pub stop_level: f64,
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub signals: Vec<SignalEvent>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: Error,
}

/// Parallel signal detection across multiple instruments
pub fn scan_parallel<'a, T, I>(
    detector: &detector::SignalDetector,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            detector
                .detect(bars)
                .map(|frame| ScanResult {
                    symbol: symbol.to_string(),
                    signals: frame.signals().copied().collect(),
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Test OHLCV bar without a timestamp
    #[derive(Debug, Clone)]
    struct Untimed {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
    }

    impl OHLCV for Untimed {
        fn open(&self) -> f64 {
            self.o
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            1000.0
        }
    }

    const DAY_MS: i64 = 86_400_000;

    fn session_bars(day: i64) -> Vec<Bar> {
        let t0 = day * DAY_MS + 14 * 3_600_000;
        vec![
            Bar::new(t0, 10.0, 10.6, 9.9, 10.5, 1000.0),
            Bar::new(t0 + 300_000, 10.4, 10.4, 10.0, 10.1, 1000.0),
            Bar::new(t0 + 600_000, 10.1, 10.6, 10.1, 10.6, 1000.0),
            Bar::new(t0 + 900_000, 10.6, 10.9, 10.5, 10.8, 1000.0),
        ]
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(100.0).is_ok());
        assert!(Threshold::new(30.0).is_ok());
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(100.1).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert!(Threshold::new(f64::INFINITY).is_err());
        assert_eq!(Threshold::new(30.0).unwrap().complement(), 70.0);
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_period_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Period>("0").is_err());
        assert_eq!(serde_json::from_str::<Period>("14").unwrap().get(), 14);
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(0, 100.0, 110.0, 90.0, 95.0, 1.0);
        assert_eq!(bar.range(), 20.0);
        assert!(bar.is_bearish());
        assert!(!bar.is_bullish());
        assert!(bar.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let bar = Bar::new(0, 100.0, 90.0, 110.0, 95.0, 1.0);
        assert!(matches!(
            bar.validate(),
            Err(Error::MalformedInput {
                reason: "high < low",
                ..
            })
        ));
    }

    #[test]
    fn test_direction() {
        assert!(Direction::Long.is_long());
        assert!(Direction::Short.is_short());
        assert_eq!(Direction::Short.sign(), -1.0);
        assert_eq!(Direction::Long.to_string(), "LONG");
        assert_eq!(serde_json::to_string(&Direction::Short).unwrap(), "\"SHORT\"");
    }

    #[test]
    fn test_untimed_bars_are_malformed() {
        let detector = detector::SignalDetector::new(detector::DetectorConfig::default()).unwrap();
        let bars = vec![
            Untimed {
                o: 1.0,
                h: 2.0,
                l: 0.5,
                c: 1.5,
            };
            4
        ];
        assert!(matches!(
            detector.detect(&bars),
            Err(Error::MalformedInput { index: 0, .. })
        ));
    }

    #[test]
    fn test_parallel_scan() {
        let detector = detector::SignalDetector::new(detector::DetectorConfig::default()).unwrap();

        let bars1 = session_bars(19_700);
        let mut bars2 = session_bars(19_701);
        bars2.swap(1, 2); // out of order

        let instruments: Vec<(&str, &[Bar])> = vec![("SPY", &bars1), ("QQQ", &bars2)];

        let (results, errors) = scan_parallel(&detector, instruments);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "SPY");
        assert_eq!(results[0].signals.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "QQQ");
    }
}
