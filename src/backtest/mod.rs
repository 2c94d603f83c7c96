pub mod metrics;

use crate::analysis::stats::Ratio;
use crate::errors::{ensure_finite, EngineError, EngineResult};
use crate::models::{volatility, PricingModel};
use crate::strategy::{self, PricingContext, StrategyKind, StrategySpec};
use crate::types::PricePoint;
use chrono::NaiveDate;
use metrics::PerformanceMetrics;
use rayon::prelude::*;

pub const MAX_LOOKBACK_DAYS: usize = 1000;
pub const MAX_HOLDING_DAYS: usize = 1000;

/// Upper bound on rows in one holding-period scan.
pub const MAX_SCAN_ROWS: usize = 100;

/// Slack when snapping a strike that already sits on the listing grid.
const GRID_TOLERANCE: f64 = 1e-9;

fn default_lookback() -> usize {
    30
}
fn default_entry_step() -> usize {
    1
}
fn default_fallback_volatility() -> f64 {
    0.30
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BacktestParams {
    pub strategy: StrategySpec,
    /// Trading days between entry and exit; also the option tenor in days.
    pub holding_days: usize,
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,
    pub rate: f64,
    #[serde(default = "default_entry_step")]
    pub entry_step: usize,
    /// Listing grid for strikes (e.g. 1.0 or 5.0). None = exact spot-relative strikes.
    #[serde(default)]
    pub strike_increment: Option<f64>,
    /// Used when the trailing window is flat and realized vol is 0.
    #[serde(default = "default_fallback_volatility")]
    pub fallback_volatility: f64,
}

impl BacktestParams {
    pub fn new(strategy: StrategySpec, holding_days: usize, rate: f64) -> Self {
        Self {
            strategy,
            holding_days,
            lookback_days: default_lookback(),
            rate,
            entry_step: default_entry_step(),
            strike_increment: None,
            fallback_volatility: default_fallback_volatility(),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_HOLDING_DAYS).contains(&self.holding_days) {
            return Err(EngineError::InvalidInput(format!(
                "holding_days must be in 1..={MAX_HOLDING_DAYS}, got {}",
                self.holding_days
            )));
        }
        if !(2..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(EngineError::InvalidInput(format!(
                "lookback_days must be in 2..={MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        if self.entry_step == 0 {
            return Err(EngineError::invalid("entry_step must be >= 1"));
        }
        ensure_finite("rate", self.rate)?;
        if let Some(inc) = self.strike_increment {
            if !(inc.is_finite() && inc > 0.0) {
                return Err(EngineError::InvalidInput(format!(
                    "strike_increment must be > 0, got {inc}"
                )));
            }
        }
        if !(self.fallback_volatility.is_finite() && self.fallback_volatility > 0.0) {
            return Err(EngineError::invalid("fallback_volatility must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BacktestTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub price_change_pct: f64,
    pub strikes: Vec<f64>,
    pub volatility: f64,
    /// Cost to open (negative for a credit).
    pub premium: f64,
    pub profit: f64,
    /// profit / |premium|.
    pub trade_return: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BacktestSummary {
    pub strategy: StrategyKind,
    pub holding_days: usize,
    pub lookback_days: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BacktestReport {
    pub summary: BacktestSummary,
    pub trades: Vec<BacktestTrade>,
}

/// One row of `holding_period_scan`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HoldingPeriodResult {
    pub holding_days: usize,
    pub total_trades: usize,
    pub total_profit: f64,
    pub win_rate_pct: f64,
    pub sharpe_ratio: f64,
    pub profit_factor: Ratio,
}

/// Snap ascending strikes onto a listing grid. A lone strike goes to the
/// nearest listing; otherwise the lower half rounds down and the upper half
/// up, and wings are pushed out so the strikes stay strictly increasing.
fn snap_strikes(strikes: &[f64], increment: Option<f64>) -> Vec<f64> {
    let Some(inc) = increment else {
        return strikes.to_vec();
    };
    if let [k] = strikes {
        return vec![((k / inc).round() * inc).max(inc)];
    }

    let mid = strikes.len() / 2;
    let mut out: Vec<f64> = strikes
        .iter()
        .enumerate()
        .map(|(i, &k)| {
            let q = k / inc;
            let steps = if i < mid { (q + GRID_TOLERANCE).floor() } else { (q - GRID_TOLERANCE).ceil() };
            steps * inc
        })
        .collect();
    for i in (0..mid.saturating_sub(1)).rev() {
        out[i] = out[i].min(out[i + 1] - inc);
    }
    for i in mid + 1..out.len() {
        out[i] = out[i].max(out[i - 1] + inc);
    }
    out
}

/// Entry indices: every `step` days from `lookback` while the exit fits.
fn entry_indices(len: usize, params: &BacktestParams) -> Vec<usize> {
    (params.lookback_days..len)
        .step_by(params.entry_step)
        .take_while(|&t| t.checked_add(params.holding_days).is_some_and(|exit| exit < len))
        .collect()
}

fn open_trade(
    history: &[PricePoint],
    closes: &[f64],
    t: usize,
    params: &BacktestParams,
    spec: &StrategySpec,
    model: &dyn PricingModel,
) -> EngineResult<BacktestTrade> {
    let entry = history[t];
    let exit = history[t + params.holding_days];

    let sigma = volatility::trailing_volatility(closes, t, params.lookback_days)
        .filter(|s| *s > 0.0)
        .unwrap_or(params.fallback_volatility);

    let strikes = snap_strikes(&spec.strikes_for(entry.close)?, params.strike_increment);

    let ctx = PricingContext::new(entry.close, params.rate, sigma, params.holding_days as f64)?;
    let position = strategy::from_strikes(spec.kind(), &strikes, spec.quantity(), &ctx, model)?;

    let profit = position.profit_at(exit.close);
    let premium = position.position_value();
    let trade_return = if premium.abs() > 1e-12 { profit / premium.abs() } else { 0.0 };

    Ok(BacktestTrade {
        entry_date: entry.date,
        exit_date: exit.date,
        entry_price: entry.close,
        exit_price: exit.close,
        price_change_pct: (exit.close - entry.close) / entry.close * 100.0,
        strikes,
        volatility: sigma,
        premium,
        profit,
        trade_return,
    })
}

/// Rolling-entry backtest over a daily close history (oldest first).
/// Strikes follow each entry's spot; explicit strikes in the StrategySpec are ignored.
/// A series too short for one entry yields an empty report, not an error.
pub fn run(
    history: &[PricePoint],
    params: &BacktestParams,
    model: &dyn PricingModel,
) -> EngineResult<BacktestReport> {
    params.validate()?;
    let closes: Vec<f64> = history.iter().map(|p| p.close).collect();
    if let Some(bad) = closes.iter().find(|c| !(c.is_finite() && **c > 0.0)) {
        return Err(EngineError::InvalidInput(format!("history has non-positive close {bad}")));
    }

    let spec = params.strategy.spot_relative();
    let trades = entry_indices(history.len(), params)
        .into_par_iter()
        .map(|t| open_trade(history, &closes, t, params, &spec, model))
        .collect::<EngineResult<Vec<_>>>()?;

    let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
    let returns: Vec<f64> = trades.iter().map(|t| t.trade_return).collect();
    let metrics = PerformanceMetrics::calculate(&profits, &returns, params.holding_days);

    let summary = BacktestSummary {
        strategy: spec.kind(),
        holding_days: params.holding_days,
        lookback_days: params.lookback_days,
        start_date: trades.first().map(|t| t.entry_date),
        end_date: trades.last().map(|t| t.exit_date),
        metrics,
    };

    tracing::debug!(
        kind = %summary.strategy,
        trades = summary.metrics.total_trades,
        total_profit = summary.metrics.total_profit,
        "backtest done"
    );

    Ok(BacktestReport { summary, trades })
}

/// Rerun the backtest for each holding period in `min..=max` by `step`.
/// Each run enters every `holding_days`, so trades never overlap.
pub fn holding_period_scan(
    history: &[PricePoint],
    params: &BacktestParams,
    min_days: usize,
    max_days: usize,
    step: usize,
    model: &dyn PricingModel,
) -> EngineResult<Vec<HoldingPeriodResult>> {
    if min_days == 0 || step == 0 || min_days > max_days || max_days > MAX_HOLDING_DAYS {
        return Err(EngineError::InvalidInput(format!(
            "bad holding period scan {min_days}..={max_days} step {step}"
        )));
    }
    let rows = (max_days - min_days) / step + 1;
    if rows > MAX_SCAN_ROWS {
        return Err(EngineError::InvalidInput(format!(
            "holding period scan would run {rows} backtests, max {MAX_SCAN_ROWS}"
        )));
    }
    (min_days..=max_days)
        .step_by(step)
        .map(|h| {
            let run_params = BacktestParams {
                holding_days: h,
                entry_step: h,
                ..*params
            };
            let m = run(history, &run_params, model)?.summary.metrics;
            Ok(HoldingPeriodResult {
                holding_days: h,
                total_trades: m.total_trades,
                total_profit: m.total_profit,
                win_rate_pct: m.win_rate_pct,
                sharpe_ratio: m.sharpe_ratio,
                profit_factor: m.profit_factor,
            })
        })
        .collect()
}

/// One row of `compare`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StrategyComparison {
    pub strategy: StrategyKind,
    pub total_trades: usize,
    pub win_rate_pct: f64,
    pub total_profit: f64,
    pub average_profit: f64,
    pub profit_factor: Ratio,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// Backtest every strategy kind at its default shape over the same history
/// and entry schedule as `params`. Rows follow `StrategyKind::ALL`.
pub fn compare(
    history: &[PricePoint],
    params: &BacktestParams,
    model: &dyn PricingModel,
) -> EngineResult<Vec<StrategyComparison>> {
    StrategyKind::ALL
        .iter()
        .map(|&kind| {
            let run_params = BacktestParams {
                strategy: StrategySpec::default_for(kind),
                ..*params
            };
            let m = run(history, &run_params, model)?.summary.metrics;
            Ok(StrategyComparison {
                strategy: kind,
                total_trades: m.total_trades,
                win_rate_pct: m.win_rate_pct,
                total_profit: m.total_profit,
                average_profit: m.average_profit,
                profit_factor: m.profit_factor,
                sharpe_ratio: m.sharpe_ratio,
                max_drawdown: m.max_drawdown,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use crate::types::fixtures::zigzag_history;

    fn straddle_params(holding: usize) -> BacktestParams {
        BacktestParams::new(StrategySpec::default_for(StrategyKind::Straddle), holding, 0.05)
    }

    #[test]
    fn test_short_series_yields_no_trades() {
        let history = zigzag_history(20, 100.0);
        let report = run(&history, &straddle_params(30), &BlackScholes::new()).unwrap();
        assert_eq!(report.summary.metrics.total_trades, 0);
        assert!(report.trades.is_empty());
        assert_eq!(report.summary.metrics.win_rate_pct, 0.0);
        assert_eq!(report.summary.metrics.sharpe_ratio, 0.0);
        assert!(report.summary.start_date.is_none());
    }

    #[test]
    fn test_entry_window_bounds() {
        let p = straddle_params(10);
        // len 45, lookback 30: t in 30..=34
        assert_eq!(entry_indices(45, &p), vec![30, 31, 32, 33, 34]);
        let stepped = BacktestParams { entry_step: 2, ..p };
        assert_eq!(entry_indices(45, &stepped), vec![30, 32, 34]);
        assert!(entry_indices(40, &p).is_empty());
    }

    #[test]
    fn test_runs_are_deterministic() {
        let history = zigzag_history(250, 100.0);
        let model = BlackScholes::new();
        for kind in StrategyKind::ALL {
            let params = BacktestParams::new(StrategySpec::default_for(kind), 10, 0.05);
            let a = run(&history, &params, &model).unwrap();
            let b = run(&history, &params, &model).unwrap();
            assert_eq!(a, b, "{kind} backtest not reproducible");
            assert_eq!(a.trades.len(), 250 - 30 - 10);
        }
    }

    #[test]
    fn test_trades_ordered_and_consistent() {
        let history = zigzag_history(120, 50.0);
        let report = run(&history, &straddle_params(5), &BlackScholes::new()).unwrap();
        for w in report.trades.windows(2) {
            assert!(w[0].entry_date < w[1].entry_date);
        }
        let m = &report.summary.metrics;
        assert_eq!(m.equity_curve.len(), m.total_trades);
        let total: f64 = report.trades.iter().map(|t| t.profit).sum();
        assert!((m.total_profit - total).abs() < 1e-9);
        assert!(m.max_drawdown >= 0.0);
        assert!(report.trades.iter().all(|t| t.premium > 0.0 && t.volatility > 0.0));
    }

    #[test]
    fn test_strike_increment_rounds() {
        let history = zigzag_history(60, 101.3);
        let params = BacktestParams {
            strike_increment: Some(5.0),
            ..straddle_params(5)
        };
        let report = run(&history, &params, &BlackScholes::new()).unwrap();
        for t in &report.trades {
            assert!(t.strikes.iter().all(|k| (k / 5.0).fract() == 0.0), "strikes {:?}", t.strikes);
        }
    }

    #[test]
    fn test_snapped_strangle_keeps_put_below_call() {
        // 5% either side of a $40 stock: both strikes would round to 40
        let history = zigzag_history(60, 40.0);
        let params = BacktestParams {
            strike_increment: Some(5.0),
            ..BacktestParams::new(StrategySpec::default_for(StrategyKind::Strangle), 5, 0.05)
        };
        let report = run(&history, &params, &BlackScholes::new()).unwrap();
        assert!(!report.trades.is_empty());
        for t in &report.trades {
            let (put, call) = (t.strikes[0], t.strikes[1]);
            assert!(put < call, "strikes {:?}", t.strikes);
            assert!(put <= t.entry_price * 0.95 && call >= t.entry_price * 1.05);
            assert!(t.strikes.iter().all(|k| (k / 5.0).fract() == 0.0));
        }
    }

    #[test]
    fn test_snap_strikes_pushes_wings_out() {
        assert_eq!(snap_strikes(&[17.0, 18.0, 22.0, 23.0], Some(5.0)), vec![10.0, 15.0, 25.0, 30.0]);
        assert_eq!(snap_strikes(&[35.0, 45.0], Some(5.0)), vec![35.0, 45.0]);
        assert_eq!(snap_strikes(&[101.3], Some(5.0)), vec![100.0]);
        assert_eq!(snap_strikes(&[38.2, 41.8], None), vec![38.2, 41.8]);
    }

    #[test]
    fn test_huge_holding_period_rejected() {
        let history = zigzag_history(60, 100.0);
        let r = run(&history, &straddle_params(usize::MAX), &BlackScholes::new());
        assert!(matches!(r, Err(EngineError::InvalidInput(_))));
        // The entry schedule itself never overflows
        assert!(entry_indices(60, &straddle_params(usize::MAX)).is_empty());
    }

    #[test]
    fn test_flat_history_uses_fallback_vol() {
        let mut history = zigzag_history(60, 100.0);
        for p in history.iter_mut() {
            p.close = 100.0;
        }
        let params = straddle_params(5);
        let report = run(&history, &params, &BlackScholes::new()).unwrap();
        assert!(report.trades.iter().all(|t| t.volatility == params.fallback_volatility));
        // Price never moves: every long straddle loses its premium
        assert_eq!(report.summary.metrics.losing_trades, report.trades.len());
        assert_eq!(report.summary.metrics.profit_factor, Ratio::Finite(0.0));
    }

    #[test]
    fn test_rejects_bad_params() {
        let model = BlackScholes::new();
        let history = zigzag_history(100, 100.0);
        let zero_hold = straddle_params(0);
        assert!(matches!(run(&history, &zero_hold, &model), Err(EngineError::InvalidInput(_))));
        let long_lookback = BacktestParams { lookback_days: 5000, ..straddle_params(5) };
        assert!(run(&history, &long_lookback, &model).is_err());
    }

    #[test]
    fn test_holding_period_scan_rows() {
        let history = zigzag_history(250, 100.0);
        let rows = holding_period_scan(&history, &straddle_params(5), 7, 30, 7, &BlackScholes::new()).unwrap();
        let days: Vec<usize> = rows.iter().map(|r| r.holding_days).collect();
        assert_eq!(days, vec![7, 14, 21, 28]);
        // Non-overlapping entries: (250 - 30 - 7) / 7 rounded up
        assert_eq!(rows[0].total_trades, (250 - 30 - 7 + 6) / 7);
    }

    #[test]
    fn test_holding_period_scan_is_bounded() {
        let history = zigzag_history(250, 100.0);
        let model = BlackScholes::new();
        let params = straddle_params(5);
        let too_many = holding_period_scan(&history, &params, 1, MAX_SCAN_ROWS + 1, 1, &model);
        assert!(matches!(too_many, Err(EngineError::InvalidInput(_))));
        assert!(holding_period_scan(&history, &params, 7, 10_000_000, 7, &model).is_err());
    }

    #[test]
    fn test_compare_runs_every_kind() {
        let history = zigzag_history(250, 100.0);
        let model = BlackScholes::new();
        let params = straddle_params(10);
        let rows = compare(&history, &params, &model).unwrap();
        let kinds: Vec<StrategyKind> = rows.iter().map(|r| r.strategy).collect();
        assert_eq!(kinds, StrategyKind::ALL.to_vec());
        assert!(rows.iter().all(|r| r.total_trades == 250 - 30 - 10));

        let straddle = run(&history, &params, &model).unwrap().summary.metrics;
        assert_eq!(rows[0].total_profit, straddle.total_profit);
        assert_eq!(rows[0].sharpe_ratio, straddle.sharpe_ratio);
    }
}
