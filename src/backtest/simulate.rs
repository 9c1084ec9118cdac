//! Forward scan of a single entry to its exit

use crate::{Direction, Error, Result, OHLCV};

use super::BacktestConfig;

const DAY_MS: f64 = 86_400_000.0;

/// Why a trade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    Stop,
    Target,
    /// Data ran out first; marked at the last close
    Open,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stop => "STOP",
            ExitReason::Target => "TARGET",
            ExitReason::Open => "OPEN",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Levels a trade is opened with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSetup {
    pub entry_index: usize,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
}

/// Where and how a forward scan ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitScan {
    pub exit_index: usize,
    pub exit_price: f64,
    pub reason: ExitReason,
    /// Worst unrealized move against the position, % of entry
    pub mae: f64,
    /// Best unrealized move in favour, % of entry
    pub mfe: f64,
}

/// A completed (or still open) round trip
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,
    pub direction: Direction,
    pub stop_loss: f64,
    pub target_price: f64,
    /// Target distance as % of entry
    pub target_pct: f64,

    pub exit_index: usize,
    pub exit_time: i64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    /// Signed return % net of commission and slippage
    pub pnl_pct: f64,
    /// `pnl_pct` scaled by position size
    pub pnl_amount: f64,
    pub pnl_dollar: f64,
    pub contracts: u32,
    pub contract_value: f64,

    pub max_adverse_excursion: f64,
    pub max_favorable_excursion: f64,
    pub bars_held: usize,
    /// Days between entry and exit timestamps
    pub hold_time: f64,
}

impl Trade {
    /// Winner on the percentage basis
    #[inline]
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }

    /// Winner on the dollar basis
    #[inline]
    pub fn is_dollar_win(&self) -> bool {
        self.pnl_dollar > 0.0
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.exit_reason == ExitReason::Open
    }
}

/// Walk bars after the entry until the stop or target is touched.
///
/// A bar that reaches both levels is a stop. Excursions only cover bars that
/// did not end the trade.
pub fn scan_exit<T: OHLCV>(bars: &[T], setup: &TradeSetup) -> ExitScan {
    let entry = setup.entry_price;
    let mut mae = 0.0_f64;
    let mut mfe = 0.0_f64;

    for (i, bar) in bars.iter().enumerate().skip(setup.entry_index + 1) {
        let (high, low) = (bar.high(), bar.low());

        let (hit_stop, hit_target, adverse, favorable) = match setup.direction {
            Direction::Long => (low <= setup.stop, high >= setup.target, entry - low, high - entry),
            Direction::Short => (high >= setup.stop, low <= setup.target, high - entry, entry - low),
        };

        if hit_stop {
            return ExitScan {
                exit_index: i,
                exit_price: setup.stop,
                reason: ExitReason::Stop,
                mae,
                mfe,
            };
        }
        if hit_target {
            return ExitScan {
                exit_index: i,
                exit_price: setup.target,
                reason: ExitReason::Target,
                mae,
                mfe,
            };
        }

        if adverse > 0.0 {
            mae = mae.max(adverse / entry * 100.0);
        }
        if favorable > 0.0 {
            mfe = mfe.max(favorable / entry * 100.0);
        }
    }

    let last = bars.len().saturating_sub(1).max(setup.entry_index);
    ExitScan {
        exit_index: last,
        exit_price: bars.get(last).map_or(entry, |b| b.close()),
        reason: ExitReason::Open,
        mae,
        mfe,
    }
}

/// Simulate one entry and price the outcome.
///
/// `timestamps` must be the validated timestamps of `bars`. An entry index
/// outside either is a [`Error::MalformedInput`].
pub fn simulate_trade<T: OHLCV>(
    bars: &[T],
    timestamps: &[i64],
    setup: &TradeSetup,
    config: &BacktestConfig,
) -> Result<Trade> {
    if setup.entry_index >= bars.len() || timestamps.len() != bars.len() {
        return Err(Error::MalformedInput {
            index: setup.entry_index,
            reason: "entry index outside bar series",
        });
    }

    let scan = scan_exit(bars, setup);
    let entry = setup.entry_price;
    let exit = scan.exit_price;
    let sign = setup.direction.sign();

    let pnl_pct = sign * (exit - entry) / entry * 100.0 - config.costs.total_pct();

    // Dollar figure ignores costs; its sign comes from price direction alone.
    let moved = (exit - entry).abs() * config.contract_value * f64::from(config.contracts);
    let favourable = sign * (exit - entry) > 0.0;
    let pnl_dollar = if favourable {
        moved
    } else if moved > 0.0 {
        -moved
    } else {
        0.0
    };

    let entry_time = timestamps[setup.entry_index];
    let exit_time = timestamps[scan.exit_index];

    Ok(Trade {
        entry_index: setup.entry_index,
        entry_time,
        entry_price: entry,
        direction: setup.direction,
        stop_loss: setup.stop,
        target_price: setup.target,
        target_pct: (setup.target - entry).abs() / entry * 100.0,
        exit_index: scan.exit_index,
        exit_time,
        exit_price: exit,
        exit_reason: scan.reason,
        pnl_pct,
        pnl_amount: pnl_pct * config.position_size_pct / 100.0,
        pnl_dollar,
        contracts: config.contracts,
        contract_value: config.contract_value,
        max_adverse_excursion: scan.mae,
        max_favorable_excursion: scan.mfe,
        bars_held: scan.exit_index - setup.entry_index,
        hold_time: (exit_time - entry_time) as f64 / DAY_MS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::CostModel;
    use crate::Bar;

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(i * 300_000, close, high, low, close, 1000.0)
    }

    fn long_setup(stop: f64, target: f64) -> TradeSetup {
        TradeSetup {
            entry_index: 0,
            direction: Direction::Long,
            entry_price: 100.0,
            stop,
            target,
        }
    }

    fn timestamps(bars: &[Bar]) -> Vec<i64> {
        bars.iter().map(|b| b.timestamp).collect()
    }

    #[test]
    fn long_stop_on_second_bar() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0),
            bar(1, 99.0, 96.0, 98.0),
            bar(2, 98.0, 94.0, 95.5),
        ];
        let scan = scan_exit(&bars, &long_setup(95.0, 105.0));
        assert_eq!(scan.reason, ExitReason::Stop);
        assert_eq!(scan.exit_index, 2);
        assert_eq!(scan.exit_price, 95.0);
        assert!((scan.mae - 4.0).abs() < 1e-12);
        assert_eq!(scan.mfe, 0.0);
    }

    #[test]
    fn same_bar_conflict_is_a_stop() {
        let bars = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 106.0, 94.0, 100.0)];
        let scan = scan_exit(&bars, &long_setup(95.0, 105.0));
        assert_eq!(scan.reason, ExitReason::Stop);
        assert_eq!(scan.exit_price, 95.0);
    }

    #[test]
    fn short_target_hit() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0),
            bar(1, 101.0, 98.0, 99.0),
            bar(2, 99.0, 94.0, 95.0),
        ];
        let setup = TradeSetup {
            entry_index: 0,
            direction: Direction::Short,
            entry_price: 100.0,
            stop: 103.0,
            target: 95.0,
        };
        let scan = scan_exit(&bars, &setup);
        assert_eq!(scan.reason, ExitReason::Target);
        assert_eq!(scan.exit_price, 95.0);
        assert!((scan.mae - 1.0).abs() < 1e-12);
        assert!((scan.mfe - 2.0).abs() < 1e-12);
    }

    #[test]
    fn open_trade_marks_last_close() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0),
            bar(1, 101.0, 99.0, 100.5),
            bar(2, 102.0, 99.5, 101.0),
        ];
        let scan = scan_exit(&bars, &long_setup(95.0, 105.0));
        assert_eq!(scan.reason, ExitReason::Open);
        assert_eq!(scan.exit_index, 2);
        assert_eq!(scan.exit_price, 101.0);
    }

    #[test]
    fn entry_on_last_bar_stays_open_at_entry() {
        let bars = vec![bar(0, 100.0, 100.0, 100.0)];
        let scan = scan_exit(&bars, &long_setup(95.0, 105.0));
        assert_eq!(scan.reason, ExitReason::Open);
        assert_eq!(scan.exit_index, 0);
        assert_eq!(scan.exit_price, 100.0);
    }

    #[test]
    fn stop_pnl_subtracts_costs() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0),
            bar(1, 99.0, 96.0, 98.0),
            bar(2, 98.0, 94.0, 95.5),
        ];
        let config = BacktestConfig {
            costs: CostModel {
                commission_pct: 0.1,
                slippage_pct: 0.05,
            },
            ..BacktestConfig::default()
        };
        let trade = simulate_trade(&bars, &timestamps(&bars), &long_setup(95.0, 105.0), &config).unwrap();
        assert!((trade.pnl_pct - (-5.0 - 0.1 - 0.05)).abs() < 1e-9);
        // 5 points * $100 * 1 contract
        assert!((trade.pnl_dollar + 500.0).abs() < 1e-9);
        assert_eq!(trade.bars_held, 2);
        assert!((trade.hold_time - 600_000.0 / 86_400_000.0).abs() < 1e-12);
    }

    #[test]
    fn dollar_sign_ignores_costs() {
        // tiny favourable move, wiped out by costs on the percentage basis
        let bars = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 100.02, 99.99, 100.01)];
        let config = BacktestConfig {
            costs: CostModel {
                commission_pct: 0.1,
                slippage_pct: 0.1,
            },
            ..BacktestConfig::default()
        };
        let trade = simulate_trade(&bars, &timestamps(&bars), &long_setup(95.0, 105.0), &config).unwrap();
        assert!(trade.is_open());
        assert!(trade.pnl_pct < 0.0);
        assert!(trade.pnl_dollar > 0.0);
        assert!(!trade.is_win());
        assert!(trade.is_dollar_win());
    }

    #[test]
    fn flat_exit_has_zero_dollars() {
        let bars = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 100.5, 99.5, 100.0)];
        let trade = simulate_trade(
            &bars,
            &timestamps(&bars),
            &long_setup(95.0, 105.0),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(trade.pnl_dollar, 0.0);
        assert!(!trade.is_dollar_win());
    }

    #[test]
    fn entry_outside_series_is_malformed() {
        let bars = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 100.5, 99.5, 100.0)];
        let setup = TradeSetup {
            entry_index: 2,
            ..long_setup(95.0, 105.0)
        };
        let err = simulate_trade(&bars, &timestamps(&bars), &setup, &BacktestConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { index: 2, .. }));
    }
}
