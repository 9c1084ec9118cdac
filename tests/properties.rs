//! Property tests for detection and backtest invariants.
//!
//! Uses proptest to verify over random bar walks:
//! 1. Stop side: long stops sit below entry, short stops above
//! 2. Determinism: detection is idempotent and parallel-safe
//! 3. Session shape: no entry before the fourth bar of its session
//! 4. Exits: stop/target trades exit at their level, after entry
//! 5. Drawdown bounds: 0 <= drawdown <= peak, 0 <= pct <= 100

use proptest::prelude::*;
use redcandle::prelude::*;

const T0: i64 = 1_700_000_000_000;
/// 20-minute bars, so a walk spans several sessions
const BAR_MS: i64 = 1_200_000;

// ── Strategies ───────────────────────────────────────────────────────

/// (close - open, upper wick, lower wick)
fn arb_step() -> impl Strategy<Value = (f64, f64, f64)> {
    (-0.5..0.5_f64, 0.0..0.3_f64, 0.0..0.3_f64)
}

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(arb_step(), 0..150).prop_map(|steps| {
        let mut close = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (delta, upper, lower))| {
                let open = close;
                close = open + delta;
                let high = open.max(close) + upper;
                let low = open.min(close) - lower;
                Bar::new(T0 + i as i64 * BAR_MS, open, high, low, close, 1000.0)
            })
            .collect()
    })
}

fn arb_policy() -> impl Strategy<Value = ExitPolicy> {
    prop_oneof![
        (0.1..10.0_f64).prop_map(ExitPolicy::Percentage),
        (0.5..4.0_f64).prop_map(ExitPolicy::RiskReward),
        (10.0..500.0_f64).prop_map(ExitPolicy::Dollar),
    ]
}

fn detector() -> SignalDetector {
    SignalDetector::new(DetectorConfig::default()).unwrap()
}

// ── Detection ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_is_opposite_the_entry(bars in arb_bars()) {
        let frame = detector().detect(&bars).unwrap();
        for s in frame.signals() {
            match s.direction {
                Direction::Long => prop_assert!(s.stop_level < s.entry_price),
                Direction::Short => prop_assert!(s.stop_level > s.entry_price),
            }
            prop_assert_eq!(s.entry_price, bars[s.index].close);
        }
    }

    #[test]
    fn detection_is_deterministic(bars in arb_bars()) {
        let det = detector();
        let first = det.detect(&bars).unwrap();
        let second = det.detect(&bars).unwrap();
        let par = det.detect_par(&bars).unwrap();
        prop_assert_eq!(first.rows(), second.rows());
        prop_assert_eq!(first.rows(), par.rows());
    }

    #[test]
    fn entries_follow_anchor_and_breakout(bars in arb_bars()) {
        let frame = detector().detect(&bars).unwrap();
        for session in frame.sessions() {
            let rows = &frame.rows()[session.range()];
            let anchor = rows.iter().position(|r| r.is_anchor);
            let breakout = rows.iter().position(|r| r.is_breakout);

            prop_assert!(!rows[0].is_anchor);
            if let Some(b) = breakout {
                prop_assert!(anchor.is_some_and(|a| a < b));
            }
            for (i, row) in rows.iter().enumerate() {
                if row.is_entry() {
                    prop_assert!(i >= 3);
                    prop_assert!(breakout.is_some_and(|b| b < i));
                }
            }
        }
    }
}

// ── Backtest ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn exits_respect_levels(bars in arb_bars(), policy in arb_policy()) {
        let frame = detector().detect(&bars).unwrap();
        let results = Backtester::new(BacktestConfig::default())
            .unwrap()
            .run_frame(&frame, policy)
            .unwrap();

        prop_assert_eq!(results.total_trades, frame.signals().count());
        for t in &results.trades {
            match t.exit_reason {
                ExitReason::Stop => {
                    prop_assert!(t.exit_index > t.entry_index);
                    prop_assert_eq!(t.exit_price, t.stop_loss);
                    prop_assert!(t.pnl_dollar < 0.0);
                }
                ExitReason::Target => {
                    prop_assert!(t.exit_index > t.entry_index);
                    prop_assert_eq!(t.exit_price, t.target_price);
                    prop_assert!(t.pnl_dollar > 0.0);
                }
                ExitReason::Open => prop_assert_eq!(t.exit_index, bars.len() - 1),
            }
            prop_assert!(t.max_adverse_excursion >= 0.0);
            prop_assert!(t.max_favorable_excursion >= 0.0);
        }
    }

    #[test]
    fn drawdown_is_bounded(bars in arb_bars(), policy in arb_policy()) {
        let frame = detector().detect(&bars).unwrap();
        let results = Backtester::new(BacktestConfig::default())
            .unwrap()
            .run_frame(&frame, policy)
            .unwrap();

        let dd = results.drawdown;
        prop_assert!(dd.max_drawdown >= 0.0);
        prop_assert!(dd.max_drawdown <= dd.peak_equity + 1e-9);
        prop_assert!((0.0..=100.0 + 1e-9).contains(&dd.max_drawdown_pct));
        prop_assert!(dd.max_equity_deficit >= 0.0);
        prop_assert!(!results.profit_factor.value().is_nan());
        prop_assert_eq!(results.winning_trades + results.losing_trades, results.total_trades);
        prop_assert_eq!(
            results.winning_trades_dollar + results.losing_trades_dollar,
            results.total_trades
        );
    }
}
