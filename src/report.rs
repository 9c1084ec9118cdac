//! Summaries and export of backtest runs
//!
//! - [`SummaryStats`]: one flat row of headline numbers per variant
//! - [`metrics_table`]: fixed-width text table comparing variants
//! - [`write_trades_csv`] / [`write_equity_csv`]: trade tape and equity curve
//! - [`to_json`]: full runs, trades included

use std::fmt::Write as _;
use std::io;

use crate::backtest::{ExitReason, ProfitFactor, ResultsAggregate, Trade, VariantRun};
use crate::{Error, Result};

// ============================================================
// SUMMARY
// ============================================================

/// Headline statistics of one variant. Rates are percentages.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryStats {
    pub label: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub win_rate_dollar: f64,
    pub profit_factor: ProfitFactor,
    pub profit_factor_dollar: ProfitFactor,
    pub total_return_pct: f64,
    pub total_dollar_return: f64,
    pub expectancy_dollar: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub targets_hit: usize,
    pub stops_hit: usize,
    pub open_trades: usize,
    pub target_hit_rate: f64,
    pub avg_holding_days: f64,
    pub avg_mae: f64,
    pub avg_mfe: f64,
}

impl SummaryStats {
    pub fn new(label: impl Into<String>, results: &ResultsAggregate) -> Self {
        let count = |reason: ExitReason| results.trades.iter().filter(|t| t.exit_reason == reason).count();
        let mean = |f: fn(&Trade) -> f64| {
            if results.trades.is_empty() {
                0.0
            } else {
                results.trades.iter().map(f).sum::<f64>() / results.trades.len() as f64
            }
        };

        let targets_hit = count(ExitReason::Target);
        let target_hit_rate = if results.total_trades > 0 {
            targets_hit as f64 / results.total_trades as f64 * 100.0
        } else {
            0.0
        };

        Self {
            label: label.into(),
            total_trades: results.total_trades,
            winning_trades: results.winning_trades,
            losing_trades: results.losing_trades,
            win_rate: results.win_rate * 100.0,
            win_rate_dollar: results.win_rate_dollar * 100.0,
            profit_factor: results.profit_factor,
            profit_factor_dollar: results.profit_factor_dollar,
            total_return_pct: results.total_return_pct,
            total_dollar_return: results.total_dollar_return,
            expectancy_dollar: results.expectancy_dollar,
            max_drawdown: results.drawdown.max_drawdown,
            max_drawdown_pct: results.drawdown.max_drawdown_pct,
            targets_hit,
            stops_hit: count(ExitReason::Stop),
            open_trades: count(ExitReason::Open),
            target_hit_rate,
            avg_holding_days: mean(|t| t.hold_time),
            avg_mae: mean(|t| t.max_adverse_excursion),
            avg_mfe: mean(|t| t.max_favorable_excursion),
        }
    }
}

impl From<&VariantRun> for SummaryStats {
    fn from(run: &VariantRun) -> Self {
        SummaryStats::new(run.label.clone(), &run.results)
    }
}

/// Side-by-side comparison of variants, one row each.
pub fn metrics_table(runs: &[VariantRun]) -> String {
    let mut out = String::with_capacity(128 * (runs.len() + 2));

    let _ = writeln!(
        out,
        "{:<14} {:>6} {:>7} {:>7} {:>8} {:>8} {:>10} {:>12} {:>10} {:>7} {:>5} {:>5} {:>5} {:>8}",
        "variant", "trades", "win%", "win$%", "pf", "pf$", "return%", "return$", "max_dd%", "tgt%", "tgt", "stop", "open", "days"
    );

    for stats in runs.iter().map(SummaryStats::from) {
        let _ = writeln!(
            out,
            "{:<14} {:>6} {:>7.2} {:>7.2} {:>8} {:>8} {:>10.2} {:>12.2} {:>10.2} {:>7.2} {:>5} {:>5} {:>5} {:>8.2}",
            stats.label,
            stats.total_trades,
            stats.win_rate,
            stats.win_rate_dollar,
            stats.profit_factor.to_string(),
            stats.profit_factor_dollar.to_string(),
            stats.total_return_pct,
            stats.total_dollar_return,
            stats.max_drawdown_pct,
            stats.target_hit_rate,
            stats.targets_hit,
            stats.stops_hit,
            stats.open_trades,
            stats.avg_holding_days,
        );
    }

    out
}

// ============================================================
// EXPORT
// ============================================================

fn export_err(e: impl std::fmt::Display) -> Error {
    Error::Export(e.to_string())
}

/// Write every trade of every run as CSV, tagged with its variant label.
pub fn write_trades_csv<W: io::Write>(runs: &[VariantRun], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record([
        "variant",
        "direction",
        "entry_index",
        "entry_time",
        "entry_price",
        "stop_loss",
        "target_price",
        "target_pct",
        "exit_index",
        "exit_time",
        "exit_price",
        "exit_reason",
        "pnl_pct",
        "pnl_amount",
        "pnl_dollar",
        "contracts",
        "contract_value",
        "mae",
        "mfe",
        "bars_held",
        "hold_time",
    ])
    .map_err(export_err)?;

    for run in runs {
        for t in &run.results.trades {
            let record = [
                run.label.clone(),
                t.direction.to_string(),
                t.entry_index.to_string(),
                t.entry_time.to_string(),
                format!("{:.6}", t.entry_price),
                format!("{:.6}", t.stop_loss),
                format!("{:.6}", t.target_price),
                format!("{:.4}", t.target_pct),
                t.exit_index.to_string(),
                t.exit_time.to_string(),
                format!("{:.6}", t.exit_price),
                t.exit_reason.to_string(),
                format!("{:.4}", t.pnl_pct),
                format!("{:.6}", t.pnl_amount),
                format!("{:.2}", t.pnl_dollar),
                t.contracts.to_string(),
                format!("{:.2}", t.contract_value),
                format!("{:.4}", t.max_adverse_excursion),
                format!("{:.4}", t.max_favorable_excursion),
                t.bars_held.to_string(),
                format!("{:.4}", t.hold_time),
            ];
            wtr.write_record(&record).map_err(export_err)?;
        }
    }

    wtr.flush().map_err(export_err)
}

/// Cumulative dollar equity after each trade, one block per variant.
pub fn write_equity_csv<W: io::Write>(runs: &[VariantRun], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["variant", "trade", "equity"]).map_err(export_err)?;
    for run in runs {
        for (i, equity) in run.results.equity_curve.iter().enumerate() {
            let record = [run.label.clone(), i.to_string(), format!("{equity:.2}")];
            wtr.write_record(&record).map_err(export_err)?;
        }
    }
    wtr.flush().map_err(export_err)
}

/// Serialize runs, trades included, to pretty JSON.
pub fn to_json(runs: &[VariantRun]) -> Result<String> {
    serde_json::to_string_pretty(runs).map_err(export_err)
}

/// Serialize one summary row per run to pretty JSON.
pub fn summaries_to_json(runs: &[VariantRun]) -> Result<String> {
    let stats: Vec<SummaryStats> = runs.iter().map(SummaryStats::from).collect();
    serde_json::to_string_pretty(&stats).map_err(export_err)
}
