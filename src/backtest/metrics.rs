//! Trade-sequence performance metrics.

use crate::analysis::stats::{self, Outcomes, Ratio};
use crate::models::volatility::TRADING_DAYS_PER_YEAR;

/// Summary statistics over an ordered list of trade profits.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Already scaled: 62.5 means 62.5%.
    pub win_rate_pct: f64,
    pub total_profit: f64,
    pub average_profit: f64,
    pub average_winner: f64,
    pub average_loser: f64,
    pub profit_factor: Ratio,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough drop of the cumulative profit curve, >= 0.
    pub max_drawdown: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
    /// Cumulative profit after each trade.
    pub equity_curve: Vec<f64>,
}

impl PerformanceMetrics {
    /// `profits` and `returns` are per trade, in trade order.
    pub fn calculate(profits: &[f64], returns: &[f64], holding_days: usize) -> Self {
        let outcomes = Outcomes::count(profits);
        let winners: Vec<f64> = profits.iter().copied().filter(|&p| p > 0.0).collect();
        let losers: Vec<f64> = profits.iter().copied().filter(|&p| p < 0.0).collect();

        let gross_profit: f64 = winners.iter().sum();
        let gross_loss: f64 = losers.iter().sum();

        let equity_curve: Vec<f64> = profits
            .iter()
            .scan(0.0, |cum, &p| {
                *cum += p;
                Some(*cum)
            })
            .collect();

        Self {
            total_trades: profits.len(),
            winning_trades: outcomes.wins,
            losing_trades: outcomes.losses,
            win_rate_pct: outcomes.win_fraction() * 100.0,
            total_profit: profits.iter().sum(),
            average_profit: stats::mean(profits),
            average_winner: stats::mean(&winners),
            average_loser: stats::mean(&losers),
            profit_factor: Ratio::of(gross_profit, gross_loss),
            sharpe_ratio: sharpe_ratio(returns, holding_days),
            max_drawdown: max_drawdown(&equity_curve),
            best_trade: profits.iter().copied().reduce(f64::max),
            worst_trade: profits.iter().copied().reduce(f64::min),
            equity_curve,
        }
    }
}

/// mean / sample std of per-trade returns, annualized by sqrt(252 / H).
/// 0.0 with fewer than two trades or no dispersion.
pub fn sharpe_ratio(returns: &[f64], holding_days: usize) -> f64 {
    if returns.len() < 2 || holding_days == 0 {
        return 0.0;
    }
    let std = stats::std_dev(returns);
    if std < 1e-12 {
        return 0.0;
    }
    let trades_per_year = TRADING_DAYS_PER_YEAR / holding_days as f64;
    stats::mean(returns) / std * trades_per_year.sqrt()
}

/// Largest decline from a running peak. The curve implicitly starts at 0.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak: f64 = 0.0;
    let mut max_dd: f64 = 0.0;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        let dd = peak - equity;
        if dd > max_dd {
            max_dd = dd;
        }
    }
    max_dd
}
