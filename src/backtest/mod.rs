//! Exit-policy backtesting of detected entries
//!
//! Every entry is simulated independently: the forward scan starts at the
//! bar after the entry and ends at the first stop or target touch, or at the
//! end of the data. Trades can overlap; no capital or position limit is
//! modelled.
//!
//! Three exit policy kinds are supported:
//!
//! - **Percentage**: target a fixed % move from entry
//! - **RiskReward**: target a multiple of the entry-to-stop distance
//! - **Dollar**: target a fixed dollar profit for the configured position

pub mod aggregate;
pub mod simulate;

pub use aggregate::{Drawdown, ProfitFactor, ResultsAggregate};
pub use simulate::{scan_exit, simulate_trade, ExitReason, ExitScan, Trade, TradeSetup};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::detector::{BarAnnotation, SignalFrame};
use crate::params::{ParamMeta, DOLLAR_TARGET, PERCENTAGE_TARGET, RISK_REWARD_RATIO};
use crate::{session, Direction, Error, Result, SignalEvent, OHLCV};

/// Percentage targets used when no variant list is configured
pub const DEFAULT_PERCENTAGE_TARGETS: [f64; 3] = [5.0, 10.0, 15.0];

// ============================================================
// EXIT POLICIES
// ============================================================

/// Rule placing the profit target of a trade
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Target `pct`% away from entry
    Percentage(f64),
    /// Target `ratio` times the entry-to-stop distance away from entry
    RiskReward(f64),
    /// Target the move worth `amount` dollars on the configured position
    Dollar(f64),
}

impl ExitPolicy {
    /// Parameter value of the policy
    #[inline]
    pub fn value(&self) -> f64 {
        match *self {
            ExitPolicy::Percentage(v) | ExitPolicy::RiskReward(v) | ExitPolicy::Dollar(v) => v,
        }
    }

    /// Variant label, e.g. `Target_5%`, `RR_1:2`, `$100`
    pub fn label(&self) -> String {
        match *self {
            ExitPolicy::Percentage(pct) => format!("Target_{pct}%"),
            ExitPolicy::RiskReward(ratio) => format!("RR_1:{ratio}"),
            ExitPolicy::Dollar(amount) => format!("${amount}"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let v = self.value();
        if !v.is_finite() || v <= 0.0 {
            return Err(Error::Configuration(format!(
                "exit policy {} needs a finite positive value",
                self.label()
            )));
        }
        Ok(())
    }

    /// Target price for an entry at `entry` with its stop at `stop`.
    pub fn target_price(&self, direction: Direction, entry: f64, stop: f64, config: &BacktestConfig) -> f64 {
        let distance = match *self {
            ExitPolicy::Percentage(pct) => entry * pct / 100.0,
            ExitPolicy::RiskReward(ratio) => (entry - stop).abs() * ratio,
            ExitPolicy::Dollar(amount) => amount / config.dollars_per_point(),
        };
        entry + direction.sign() * distance
    }
}

impl std::fmt::Display for ExitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Lists of policy variants to evaluate.
///
/// `None` means "not requested". A list that is present but empty is a
/// configuration error. When all three are `None`, the default percentage
/// targets are used.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExitPolicySet {
    pub percentage: Option<Vec<f64>>,
    pub risk_reward: Option<Vec<f64>>,
    pub dollar: Option<Vec<f64>>,
}

impl ExitPolicySet {
    /// Build a set from parameter grids, one optional grid per policy kind.
    pub fn from_grid(
        percentage: Option<&ParamMeta>,
        risk_reward: Option<&ParamMeta>,
        dollar: Option<&ParamMeta>,
    ) -> Self {
        Self {
            percentage: percentage.map(ParamMeta::generate_grid),
            risk_reward: risk_reward.map(ParamMeta::generate_grid),
            dollar: dollar.map(ParamMeta::generate_grid),
        }
    }

    /// Sweep every policy kind over its default grid.
    pub fn full_sweep() -> Self {
        Self::from_grid(Some(&PERCENTAGE_TARGET), Some(&RISK_REWARD_RATIO), Some(&DOLLAR_TARGET))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, list) in [
            ("percentage", &self.percentage),
            ("risk_reward", &self.risk_reward),
            ("dollar", &self.dollar),
        ] {
            if matches!(list, Some(values) if values.is_empty()) {
                return Err(Error::Configuration(format!(
                    "{name} exit policy list is present but empty"
                )));
            }
        }
        self.variants().iter().try_for_each(ExitPolicy::validate)
    }

    /// Every variant in evaluation order: percentage, risk-reward, dollar.
    pub fn variants(&self) -> Vec<ExitPolicy> {
        if self.percentage.is_none() && self.risk_reward.is_none() && self.dollar.is_none() {
            return DEFAULT_PERCENTAGE_TARGETS
                .iter()
                .copied()
                .map(ExitPolicy::Percentage)
                .collect();
        }

        let kinds: [(&Option<Vec<f64>>, fn(f64) -> ExitPolicy); 3] = [
            (&self.percentage, ExitPolicy::Percentage),
            (&self.risk_reward, ExitPolicy::RiskReward),
            (&self.dollar, ExitPolicy::Dollar),
        ];
        kinds
            .into_iter()
            .flat_map(|(list, make)| list.iter().flatten().copied().map(make))
            .collect()
    }
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Round-trip costs, in percent, subtracted from every trade's return
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl CostModel {
    #[inline]
    pub fn total_pct(&self) -> f64 {
        self.commission_pct + self.slippage_pct
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("commission_pct", self.commission_pct), ("slippage_pct", self.slippage_pct)] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Configuration(format!(
                    "{name} must be a finite non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Backtest settings shared by every policy variant
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub policies: ExitPolicySet,
    #[serde(flatten)]
    pub costs: CostModel,
    /// Position size, % of account, used to scale `pnl_amount`
    pub position_size_pct: f64,
    pub contracts: u32,
    /// Dollar value of a one-point move for one contract
    pub contract_value: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            policies: ExitPolicySet::default(),
            costs: CostModel::default(),
            position_size_pct: 1.0,
            contracts: 1,
            contract_value: 100.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        self.costs.validate()?;
        if !self.position_size_pct.is_finite() || self.position_size_pct <= 0.0 {
            return Err(Error::Configuration(format!(
                "position_size_pct must be positive, got {}",
                self.position_size_pct
            )));
        }
        if self.contracts == 0 {
            return Err(Error::Configuration("contracts must be at least 1".into()));
        }
        if !self.contract_value.is_finite() || self.contract_value <= 0.0 {
            return Err(Error::Configuration(format!(
                "contract_value must be positive, got {}",
                self.contract_value
            )));
        }
        self.policies.validate()
    }

    /// Dollars gained or lost per point of price movement
    #[inline]
    pub fn dollars_per_point(&self) -> f64 {
        self.contract_value * f64::from(self.contracts)
    }
}

// ============================================================
// ENTRY EVENTS
// ============================================================

/// Anything that can open a trade: a bar index, a side and a stop.
///
/// Rows without a side or stop are skipped by the backtester.
pub trait EntryEvent {
    fn bar_index(&self) -> usize;
    fn direction(&self) -> Option<Direction>;
    fn stop_level(&self) -> Option<f64>;
}

impl EntryEvent for SignalEvent {
    fn bar_index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> Option<Direction> {
        Some(self.direction)
    }

    fn stop_level(&self) -> Option<f64> {
        Some(self.stop_level)
    }
}

impl EntryEvent for BarAnnotation {
    fn bar_index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> Option<Direction> {
        self.signal.map(|s| s.direction)
    }

    fn stop_level(&self) -> Option<f64> {
        self.signal.map(|s| s.stop_level)
    }
}

impl<E: EntryEvent + ?Sized> EntryEvent for &E {
    fn bar_index(&self) -> usize {
        (**self).bar_index()
    }

    fn direction(&self) -> Option<Direction> {
        (**self).direction()
    }

    fn stop_level(&self) -> Option<f64> {
        (**self).stop_level()
    }
}

// ============================================================
// BACKTESTER
// ============================================================

/// Results of one policy variant
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantRun {
    pub label: String,
    pub results: ResultsAggregate,
}

impl VariantRun {
    #[inline]
    pub fn policy(&self) -> ExitPolicy {
        self.results.policy
    }
}

/// Runs exit-policy variants over a bar series and its entries
#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    /// Build a backtester, validating the configuration.
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Simulate every usable entry under `policy`.
    ///
    /// Entries with no side or a non-finite stop are skipped. An entry index
    /// outside `bars` is a [`Error::MalformedInput`].
    pub fn run<T: OHLCV, E: EntryEvent>(
        &self,
        bars: &[T],
        events: &[E],
        policy: ExitPolicy,
    ) -> Result<ResultsAggregate> {
        policy.validate()?;
        let timestamps = session::validate_series(bars)?;
        let setups = self.setups(bars, events, policy)?;
        self.simulate(bars, &timestamps, &setups, policy)
    }

    /// [`run`](Backtester::run) over the entries of a detection frame.
    pub fn run_frame<T: OHLCV>(&self, frame: &SignalFrame<'_, T>, policy: ExitPolicy) -> Result<ResultsAggregate> {
        let entries: Vec<&SignalEvent> = frame.signals().collect();
        self.run(frame.bars(), &entries, policy)
    }

    /// Evaluate every configured variant on the rayon pool.
    ///
    /// Output order matches [`ExitPolicySet::variants`].
    pub fn run_all<T: OHLCV + Sync>(&self, frame: &SignalFrame<'_, T>) -> Result<Vec<VariantRun>> {
        let bars = frame.bars();
        let timestamps = session::validate_series(bars)?;
        let entries: Vec<&SignalEvent> = frame.signals().collect();

        let plans = self
            .config
            .policies
            .variants()
            .into_iter()
            .map(|policy| self.setups(bars, &entries, policy).map(|s| (policy, s)))
            .collect::<Result<Vec<_>>>()?;

        plans
            .par_iter()
            .map(|(policy, setups)| {
                self.simulate(bars, &timestamps, setups, *policy).map(|results| VariantRun {
                    label: policy.label(),
                    results,
                })
            })
            .collect()
    }

    fn setups<T: OHLCV, E: EntryEvent>(&self, bars: &[T], events: &[E], policy: ExitPolicy) -> Result<Vec<TradeSetup>> {
        let mut setups = Vec::with_capacity(events.len());

        for event in events {
            let index = event.bar_index();
            let bar = bars.get(index).ok_or(Error::MalformedInput {
                index,
                reason: "entry index outside bar series",
            })?;

            let (direction, stop) = match (event.direction(), event.stop_level()) {
                (Some(d), Some(s)) if s.is_finite() => (d, s),
                _ => {
                    debug!(index, "entry without side or stop, skipped");
                    continue;
                }
            };

            let entry_price = bar.close();
            setups.push(TradeSetup {
                entry_index: index,
                direction,
                entry_price,
                stop,
                target: policy.target_price(direction, entry_price, stop, &self.config),
            });
        }

        Ok(setups)
    }

    fn simulate<T: OHLCV>(
        &self,
        bars: &[T],
        timestamps: &[i64],
        setups: &[TradeSetup],
        policy: ExitPolicy,
    ) -> Result<ResultsAggregate> {
        let trades = setups
            .iter()
            .map(|setup| simulate_trade(bars, timestamps, setup, &self.config))
            .collect::<Result<Vec<_>>>()?;

        let results = ResultsAggregate::fold(policy, trades);
        info!(
            variant = %policy,
            trades = results.total_trades,
            win_rate = results.win_rate,
            profit_factor = %results.profit_factor,
            dollar_return = results.total_dollar_return,
            "variant complete"
        );
        Ok(results)
    }
}

// ============================================================
// TESTS
// ============================================================
