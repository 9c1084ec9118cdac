//! Per-session pattern state machine
//!
//! One [`SessionPhase`] value walks the bars of a trading session (opening
//! bar excluded). Each call to [`SessionPhase::step`] consumes one bar and
//! reports what, if anything, that bar did to the pattern.
//!
//! The two re-arm latches are folded into the phase itself: once the breakout
//! is known, a spent high latch means the last close sat above the breakout
//! high, and a spent low latch means it sat below the breakout low. Both can
//! never be spent at once, so three armed phases cover every latch state.

use crate::{Direction, OHLCVExt, OHLCV};

/// High/low of a reference candle, with its position in the series
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceRange {
    pub index: usize,
    pub high: f64,
    pub low: f64,
}

impl PriceRange {
    pub fn of<T: OHLCV>(index: usize, bar: &T) -> Self {
        Self {
            index,
            high: bar.high(),
            low: bar.low(),
        }
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.high <= self.low
    }

    /// Stop level for an entry in `direction`: the opposite extreme.
    #[inline]
    pub fn stop_for(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.low,
            Direction::Short => self.high,
        }
    }
}

/// Scan state of a single trading session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SessionPhase {
    /// Waiting for the first red candle
    #[default]
    SeekingAnchor,
    /// Waiting for a close outside the anchor's range
    SeekingBreakout { anchor: PriceRange },
    /// Both sides may fire
    ArmedBoth { breakout: PriceRange },
    /// Only a long may fire; the last close was below the breakout low
    ArmedHighOnly { breakout: PriceRange },
    /// Only a short may fire; the last close was above the breakout high
    ArmedLowOnly { breakout: PriceRange },
    /// Breakout candle had no range; nothing more can happen this session
    Exhausted,
}

/// What a single bar did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Anchor,
    Breakout,
    Entry(Direction),
}

impl SessionPhase {
    /// Breakout range once the session is armed.
    pub fn breakout(&self) -> Option<PriceRange> {
        match *self {
            SessionPhase::ArmedBoth { breakout }
            | SessionPhase::ArmedHighOnly { breakout }
            | SessionPhase::ArmedLowOnly { breakout } => Some(breakout),
            _ => None,
        }
    }

    /// Advance by one bar.
    pub fn step<T: OHLCV>(self, index: usize, bar: &T) -> (SessionPhase, Option<PhaseEvent>) {
        let close = bar.close();

        match self {
            SessionPhase::SeekingAnchor => {
                if bar.is_bearish() {
                    let anchor = PriceRange::of(index, bar);
                    (SessionPhase::SeekingBreakout { anchor }, Some(PhaseEvent::Anchor))
                } else {
                    (self, None)
                }
            }

            SessionPhase::SeekingBreakout { anchor } => {
                // High side is evaluated first
                if close > anchor.high || close < anchor.low {
                    let breakout = PriceRange::of(index, bar);
                    let next = if breakout.is_degenerate() {
                        SessionPhase::Exhausted
                    } else {
                        SessionPhase::ArmedBoth { breakout }
                    };
                    (next, Some(PhaseEvent::Breakout))
                } else {
                    (self, None)
                }
            }

            SessionPhase::ArmedBoth { breakout } => {
                if close > breakout.high {
                    (
                        SessionPhase::ArmedLowOnly { breakout },
                        Some(PhaseEvent::Entry(Direction::Long)),
                    )
                } else if close < breakout.low {
                    (
                        SessionPhase::ArmedHighOnly { breakout },
                        Some(PhaseEvent::Entry(Direction::Short)),
                    )
                } else {
                    (self, None)
                }
            }

            SessionPhase::ArmedLowOnly { breakout } => {
                if close > breakout.high {
                    // still above: sustained move, no new signal
                    (self, None)
                } else if close < breakout.low {
                    (
                        SessionPhase::ArmedHighOnly { breakout },
                        Some(PhaseEvent::Entry(Direction::Short)),
                    )
                } else {
                    (SessionPhase::ArmedBoth { breakout }, None)
                }
            }

            SessionPhase::ArmedHighOnly { breakout } => {
                if close < breakout.low {
                    (self, None)
                } else if close > breakout.high {
                    (
                        SessionPhase::ArmedLowOnly { breakout },
                        Some(PhaseEvent::Entry(Direction::Long)),
                    )
                } else {
                    (SessionPhase::ArmedBoth { breakout }, None)
                }
            }

            SessionPhase::Exhausted => (self, None),
        }
    }
}
