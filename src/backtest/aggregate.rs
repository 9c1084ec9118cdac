//! Folding trades into a results aggregate
//!
//! Equity is the running sum of dollar P&L in entry-time order. Trades are
//! treated as independent, even when they overlap in time.

use std::fmt;

use super::simulate::Trade;
use super::ExitPolicy;

/// Gross profit / gross loss, with an explicit value for "no losses"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitFactor {
    Finite(f64),
    /// Winners and no losers
    Infinite,
}

impl ProfitFactor {
    /// Empty and zero-profit sets give `Finite(0.0)`.
    pub fn from_gross(gross_profit: f64, gross_loss: f64) -> Self {
        if gross_loss > 0.0 {
            ProfitFactor::Finite(gross_profit / gross_loss)
        } else if gross_profit > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Finite(0.0)
        }
    }

    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, ProfitFactor::Infinite)
    }

    /// Numeric view; `Infinite` maps to `f64::INFINITY`.
    #[inline]
    pub fn value(self) -> f64 {
        match self {
            ProfitFactor::Finite(v) => v,
            ProfitFactor::Infinite => f64::INFINITY,
        }
    }
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitFactor::Finite(v) => write!(f, "{v:.4}"),
            ProfitFactor::Infinite => f.write_str("inf"),
        }
    }
}

// JSON has no infinity, so the sentinel travels as the string "inf".
impl serde::Serialize for ProfitFactor {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            ProfitFactor::Finite(v) => s.serialize_f64(*v),
            ProfitFactor::Infinite => s.serialize_str("inf"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for ProfitFactor {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Number(v) => Ok(ProfitFactor::Finite(v)),
            Raw::Text(t) if t == "inf" => Ok(ProfitFactor::Infinite),
            Raw::Text(t) => Err(serde::de::Error::custom(format!("invalid profit factor {t:?}"))),
        }
    }
}

/// Peak-to-trough statistics of the dollar equity curve
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Drawdown {
    /// Largest drop from a positive peak, capped at that peak
    pub max_drawdown: f64,
    /// Largest drop as % of the peak it fell from, tracked apart from `max_drawdown`
    pub max_drawdown_pct: f64,
    pub peak_equity: f64,
    /// How far equity ever sat below zero (0 if never)
    pub max_equity_deficit: f64,
}

/// Running state of the fold
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    wins: usize,
    losses: usize,
    dollar_wins: usize,
    dollar_losses: usize,
    gross_win_amount: f64,
    gross_loss_amount: f64,
    gross_dollar_profit: f64,
    gross_dollar_loss: f64,
    total_amount: f64,
    equity: f64,
    drawdown: Drawdown,
}

impl Tally {
    fn push(mut self, trade: &Trade) -> Self {
        if trade.is_win() {
            self.wins += 1;
            self.gross_win_amount += trade.pnl_amount;
        } else {
            self.losses += 1;
            self.gross_loss_amount += trade.pnl_amount.abs();
        }

        if trade.is_dollar_win() {
            self.dollar_wins += 1;
            self.gross_dollar_profit += trade.pnl_dollar;
        } else {
            self.dollar_losses += 1;
            self.gross_dollar_loss += trade.pnl_dollar.abs();
        }

        self.total_amount += trade.pnl_amount;
        self.equity += trade.pnl_dollar;

        let dd = &mut self.drawdown;
        dd.peak_equity = dd.peak_equity.max(self.equity);
        dd.max_equity_deficit = dd.max_equity_deficit.max(-self.equity);
        if dd.peak_equity > 0.0 {
            let drop = (dd.peak_equity - self.equity).clamp(0.0, dd.peak_equity);
            dd.max_drawdown = dd.max_drawdown.max(drop);
            dd.max_drawdown_pct = dd.max_drawdown_pct.max(drop / dd.peak_equity * 100.0);
        }

        self
    }
}

#[inline]
fn ratio(num: f64, den: usize) -> f64 {
    if den > 0 {
        num / den as f64
    } else {
        0.0
    }
}

/// Trades and statistics for one exit-policy variant over one dataset
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultsAggregate {
    pub policy: ExitPolicy,
    /// In entry-time order
    pub trades: Vec<Trade>,
    /// Cumulative dollar P&L after each trade
    pub equity_curve: Vec<f64>,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub winning_trades_dollar: usize,
    pub losing_trades_dollar: usize,

    /// Fraction of trades with positive `pnl_pct`
    pub win_rate: f64,
    /// Fraction of trades with positive `pnl_dollar`
    pub win_rate_dollar: f64,

    pub avg_profit: f64,
    pub avg_loss: f64,
    pub profit_factor: ProfitFactor,
    pub total_return: f64,
    pub total_return_pct: f64,
    /// Mean position-sized return per trade
    pub expectancy: f64,

    pub total_dollar_return: f64,
    pub total_dollar_profit: f64,
    pub total_dollar_loss: f64,
    pub avg_dollar_profit: f64,
    pub avg_dollar_loss: f64,
    pub profit_factor_dollar: ProfitFactor,
    pub expectancy_dollar: f64,

    #[serde(flatten)]
    pub drawdown: Drawdown,
}

impl ResultsAggregate {
    /// Order trades by entry time and fold them into statistics.
    pub fn fold(policy: ExitPolicy, mut trades: Vec<Trade>) -> Self {
        trades.sort_by_key(|t| (t.entry_time, t.entry_index));

        let equity_curve: Vec<f64> = trades
            .iter()
            .scan(0.0, |equity, t| {
                *equity += t.pnl_dollar;
                Some(*equity)
            })
            .collect();

        let tally = trades.iter().fold(Tally::default(), Tally::push);
        let n = trades.len();

        Self {
            policy,
            equity_curve,
            total_trades: n,
            winning_trades: tally.wins,
            losing_trades: tally.losses,
            winning_trades_dollar: tally.dollar_wins,
            losing_trades_dollar: tally.dollar_losses,
            win_rate: ratio(tally.wins as f64, n),
            win_rate_dollar: ratio(tally.dollar_wins as f64, n),
            avg_profit: ratio(tally.gross_win_amount, tally.wins),
            avg_loss: ratio(tally.gross_loss_amount, tally.losses),
            profit_factor: ProfitFactor::from_gross(tally.gross_win_amount, tally.gross_loss_amount),
            total_return: tally.total_amount,
            total_return_pct: tally.total_amount * 100.0,
            expectancy: ratio(tally.total_amount, n),
            total_dollar_return: tally.equity,
            total_dollar_profit: tally.gross_dollar_profit,
            total_dollar_loss: tally.gross_dollar_loss,
            avg_dollar_profit: ratio(tally.gross_dollar_profit, tally.dollar_wins),
            avg_dollar_loss: ratio(tally.gross_dollar_loss, tally.dollar_losses),
            profit_factor_dollar: ProfitFactor::from_gross(
                tally.gross_dollar_profit,
                tally.gross_dollar_loss,
            ),
            expectancy_dollar: ratio(tally.equity, n),
            drawdown: tally.drawdown,
            trades,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> + '_ {
        self.trades.iter().filter(|t| t.is_open())
    }
}
