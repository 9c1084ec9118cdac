//! Red Candle Theory signal detector
//!
//! Per trading session:
//!
//! - the opening bar is flagged and skipped,
//! - the first red candle (close < open) becomes the **anchor**,
//! - the first later close outside the anchor's high/low is the **breakout**,
//! - every later close outside the breakout's range is an **entry**, long above
//!   the high (stop at the breakout low) and short below the low (stop at the
//!   breakout high), with one signal per side until price closes back inside.
//!
//! Sessions with fewer than four bars are skipped. Detection never fails for
//! lack of signals; only malformed bars are errors.

pub mod filters;
pub mod state;

use chrono::{FixedOffset, NaiveDate};
use rayon::prelude::*;
use tracing::debug;

pub use filters::FilterConfig;
pub use state::{PhaseEvent, PriceRange, SessionPhase};

use crate::session::{self, Session};
use crate::{Direction, Result, SignalEvent, OHLCV};

/// Fewest bars a session needs: opening bar, anchor, breakout, entry.
pub const MIN_SESSION_BARS: usize = 4;

// ============================================================
// CONFIG
// ============================================================

/// Detector configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Offset (minutes east of UTC) used to find each bar's trading date
    pub utc_offset_minutes: i32,
    /// Apply the RSI/volume confirmation mask
    pub use_filters: bool,
    pub filter: FilterConfig,
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        session::utc_offset(self.utc_offset_minutes)?;
        self.filter.validate()
    }

    /// Default config with the confirmation filter switched on
    pub fn filtered() -> Self {
        Self {
            use_filters: true,
            ..Self::default()
        }
    }
}

// ============================================================
// OUTPUT
// ============================================================

/// Per-bar detection output
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BarAnnotation {
    pub index: usize,
    pub timestamp: i64,
    pub session: NaiveDate,
    pub is_first_candle: bool,
    /// First red candle of the session
    pub is_anchor: bool,
    /// Candle whose close broke the anchor's range
    pub is_breakout: bool,
    /// Entry emitted on this bar (after filtering)
    pub signal: Option<SignalEvent>,
    /// Entry the confirmation filter removed
    pub suppressed: Option<SignalEvent>,
    /// Filter readings, present only in filter mode
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl BarAnnotation {
    #[inline]
    pub fn is_entry(&self) -> bool {
        self.signal.is_some()
    }

    #[inline]
    pub fn is_long_entry(&self) -> bool {
        self.direction() == Some(Direction::Long)
    }

    #[inline]
    pub fn is_short_entry(&self) -> bool {
        self.direction() == Some(Direction::Short)
    }

    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.signal.map(|s| s.direction)
    }

    #[inline]
    pub fn stop_level(&self) -> Option<f64> {
        self.signal.map(|s| s.stop_level)
    }
}

/// Bars decorated with detection results. Borrows the input; the bars
/// themselves are never touched.
#[derive(Debug, Clone)]
pub struct SignalFrame<'a, T: OHLCV> {
    bars: &'a [T],
    rows: Vec<BarAnnotation>,
    sessions: Vec<Session>,
}

impl<'a, T: OHLCV> SignalFrame<'a, T> {
    #[inline]
    pub fn bars(&self) -> &'a [T] {
        self.bars
    }

    #[inline]
    pub fn rows(&self) -> &[BarAnnotation] {
        &self.rows
    }

    #[inline]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entry events in ascending time order
    pub fn signals(&self) -> impl Iterator<Item = &SignalEvent> + '_ {
        self.rows.iter().filter_map(|r| r.signal.as_ref())
    }

    /// Entries removed by the confirmation filter
    pub fn suppressed(&self) -> impl Iterator<Item = &SignalEvent> + '_ {
        self.rows.iter().filter_map(|r| r.suppressed.as_ref())
    }
}

// ============================================================
// DETECTOR
// ============================================================

/// What one session produced
#[derive(Debug, Clone, Default, PartialEq)]
struct SessionScan {
    anchor: Option<usize>,
    breakout: Option<usize>,
    events: Vec<SignalEvent>,
}

/// Red Candle Theory detector
#[derive(Debug, Clone)]
pub struct SignalDetector {
    config: DetectorConfig,
    offset: FixedOffset,
}

impl SignalDetector {
    /// Build a detector, validating the configuration.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let offset = session::utc_offset(config.utc_offset_minutes)?;
        Ok(Self { config, offset })
    }

    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Scan all sessions sequentially.
    pub fn detect<'a, T: OHLCV>(&self, bars: &'a [T]) -> Result<SignalFrame<'a, T>> {
        let timestamps = session::validate_series(bars)?;
        let sessions = session::partition(&timestamps, self.offset)?;

        let scans: Vec<SessionScan> = sessions
            .iter()
            .map(|s| self.scan_session(bars, &timestamps, s))
            .collect();

        Ok(self.assemble(bars, &timestamps, sessions, scans))
    }

    /// Scan sessions on the rayon pool. Output is identical to [`detect`].
    ///
    /// [`detect`]: SignalDetector::detect
    pub fn detect_par<'a, T: OHLCV + Sync>(&self, bars: &'a [T]) -> Result<SignalFrame<'a, T>> {
        let timestamps = session::validate_series(bars)?;
        let sessions = session::partition(&timestamps, self.offset)?;

        // indexed collect keeps session order
        let scans: Vec<SessionScan> = sessions
            .par_iter()
            .map(|s| self.scan_session(bars, &timestamps, s))
            .collect();

        Ok(self.assemble(bars, &timestamps, sessions, scans))
    }

    fn scan_session<T: OHLCV>(&self, bars: &[T], timestamps: &[i64], session: &Session) -> SessionScan {
        let mut scan = SessionScan::default();

        if session.len() < MIN_SESSION_BARS {
            debug!(date = %session.date, bars = session.len(), "session too short, skipped");
            return scan;
        }

        let mut phase = SessionPhase::SeekingAnchor;
        for index in (session.start + 1)..session.end {
            let bar = &bars[index];
            let (next, event) = phase.step(index, bar);

            match event {
                Some(PhaseEvent::Anchor) => scan.anchor = Some(index),
                Some(PhaseEvent::Breakout) => scan.breakout = Some(index),
                Some(PhaseEvent::Entry(direction)) => {
                    if let Some(breakout) = phase.breakout() {
                        scan.events.push(SignalEvent {
                            index,
                            timestamp: timestamps[index],
                            direction,
                            entry_price: bar.close(),
                            stop_level: breakout.stop_for(direction),
                        });
                    }
                }
                None => {}
            }

            phase = next;
            if phase == SessionPhase::Exhausted {
                break;
            }
        }

        debug!(
            date = %session.date,
            anchor = ?scan.anchor,
            breakout = ?scan.breakout,
            signals = scan.events.len(),
            "session scanned"
        );
        scan
    }

    fn assemble<'a, T: OHLCV>(
        &self,
        bars: &'a [T],
        timestamps: &[i64],
        sessions: Vec<Session>,
        scans: Vec<SessionScan>,
    ) -> SignalFrame<'a, T> {
        let mut rows: Vec<BarAnnotation> = Vec::with_capacity(bars.len());

        for (session, scan) in sessions.iter().zip(scans) {
            for index in session.range() {
                rows.push(BarAnnotation {
                    index,
                    timestamp: timestamps[index],
                    session: session.date,
                    is_first_candle: index == session.start,
                    is_anchor: scan.anchor == Some(index),
                    is_breakout: scan.breakout == Some(index),
                    signal: None,
                    suppressed: None,
                    rsi: None,
                    volume_ratio: None,
                });
            }
            for event in scan.events {
                rows[event.index].signal = Some(event);
            }
        }

        if self.config.use_filters {
            self.apply_filters(bars, &mut rows);
        }

        SignalFrame {
            bars,
            rows,
            sessions,
        }
    }

    /// Post-detection mask; anchors and breakouts are left alone.
    fn apply_filters<T: OHLCV>(&self, bars: &[T], rows: &mut [BarAnnotation]) {
        let filter = &self.config.filter;
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume()).collect();
        let rsi = filters::rsi(&closes, filter.rsi_period.get());
        let vol = filters::volume_ratio(&volumes, filter.volume_period.get());

        for row in rows.iter_mut() {
            let (r, v) = (rsi[row.index], vol[row.index]);
            row.rsi = Some(r);
            row.volume_ratio = Some(v);

            if let Some(event) = row.signal {
                if !filter.passes(event.direction, r, v) {
                    debug!(index = row.index, direction = %event.direction, rsi = r, volume_ratio = v, "signal filtered");
                    row.signal = None;
                    row.suppressed = Some(event);
                }
            }
        }
    }
}
