//! Realized volatility from daily closes.
//!
//! sigma = stdev(ln(P_i / P_{i-1})) * sqrt(252)
//!
//! Sample (n-1) variance over `log_returns`. All helpers are pure.

/// Trading days per year used to annualize daily return volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Windows reported by `term_structure` (trading days).
pub const TERM_STRUCTURE_WINDOWS: [usize; 5] = [30, 60, 90, 180, 252];

/// One point of the realized-volatility term structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VolPoint {
    pub period: usize,
    pub period_label: String,
    /// Annualized, as a fraction (0.25 = 25%).
    pub volatility: f64,
}

/// Log returns between consecutive closes. Non-positive or non-finite closes
/// break the chain and their returns are skipped.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter_map(|w| {
            let r = (w[1] / w[0]).ln();
            (w[0] > 0.0 && r.is_finite()).then_some(r)
        })
        .collect()
}

/// Annualized realized volatility of a close series. 0.0 when fewer than 3 closes.
pub fn realized_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 3 {
        return 0.0;
    }
    let returns = log_returns(closes);
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var_sum: f64 = returns.iter().map(|r| (r - mean) * (r - mean)).sum();

    (var_sum / (n - 1.0)).sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Volatility over the `lookback` returns ending at index `t`
/// (closes[t - lookback ..= t]). None when the window does not fit.
#[inline]
pub fn trailing_volatility(closes: &[f64], t: usize, lookback: usize) -> Option<f64> {
    if lookback < 2 || t >= closes.len() || t < lookback {
        return None;
    }
    Some(realized_volatility(&closes[t - lookback..=t]))
}

/// Realized volatility over the standard windows, most recent data.
/// Windows longer than the available history are omitted.
pub fn term_structure(closes: &[f64], windows: &[usize]) -> Vec<VolPoint> {
    windows
        .iter()
        .filter(|&&w| w >= 2 && w < closes.len())
        .map(|&w| VolPoint {
            period: w,
            period_label: format!("{w}d"),
            volatility: realized_volatility(&closes[closes.len() - w - 1..]),
        })
        .collect()
}
