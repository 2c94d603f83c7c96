use crate::errors::{EngineError, EngineResult};
use crate::models::{PricingModel, DAYS_PER_YEAR};
use crate::strategy::{self, PricingContext, Strategy, StrategySpec};

/// Upper bound on the length of any scenario axis or profile.
pub const MAX_AXIS_POINTS: usize = 200;

/// One cell of the price-change grid, evaluated at expiry.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScenarioPoint {
    /// Percent units: -30.0 is a 30% drop.
    pub price_change_pct: f64,
    pub final_price: f64,
    /// Set only on expiry grids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_to_expiry: Option<f64>,
    pub payoff: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ProfilePoint {
    pub price: f64,
    pub payoff: f64,
    pub profit: f64,
}

/// Evenly spaced percent axis, both ends included.
pub fn price_change_axis(lower: f64, upper: f64, step: f64) -> EngineResult<Vec<f64>> {
    if !(lower.is_finite() && upper.is_finite() && step.is_finite()) || step <= 0.0 || lower > upper {
        return Err(EngineError::InvalidInput(format!(
            "bad price-change axis {lower}..{upper} step {step}"
        )));
    }
    let n = ((upper - lower) / step + 1e-9).floor();
    if n >= MAX_AXIS_POINTS as f64 {
        return Err(EngineError::InvalidInput(format!(
            "price-change axis {lower}..{upper} step {step} exceeds {MAX_AXIS_POINTS} points"
        )));
    }
    let n = n as usize;
    Ok((0..=n).map(|i| lower + i as f64 * step).collect())
}

/// -30% .. +30% in 5 point steps.
pub fn default_price_changes() -> Vec<f64> {
    (-6..=6).map(|i| i as f64 * 5.0).collect()
}

fn sorted_axis(name: &str, values: &[f64]) -> EngineResult<Vec<f64>> {
    if values.is_empty() {
        return Err(EngineError::InvalidInput(format!("{name} axis is empty")));
    }
    if values.len() > MAX_AXIS_POINTS {
        return Err(EngineError::InvalidInput(format!(
            "{name} axis has {} points, max {MAX_AXIS_POINTS}",
            values.len()
        )));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(EngineError::InvalidInput(format!("{name} axis has non-finite value {bad}")));
    }
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    Ok(out)
}

fn final_price(spot: f64, pct: f64) -> EngineResult<f64> {
    if pct <= -100.0 {
        return Err(EngineError::InvalidInput(format!(
            "price change {pct}% would take the underlying to or below zero"
        )));
    }
    Ok(spot * (1.0 + pct / 100.0))
}

fn point(strategy: &Strategy, pct: f64, days: Option<f64>) -> EngineResult<ScenarioPoint> {
    let final_price = final_price(strategy.spot, pct)?;
    Ok(ScenarioPoint {
        price_change_pct: pct,
        final_price,
        days_to_expiry: days,
        payoff: strategy.payoff_at(final_price),
        profit: strategy.profit_at(final_price),
    })
}

/// Expiry profit of an already-built strategy over a price-change axis.
/// Output ascends by percentage.
pub fn grid(strategy: &Strategy, price_changes: &[f64]) -> EngineResult<Vec<ScenarioPoint>> {
    let pcts = sorted_axis("price change", price_changes)?;
    pcts.iter().map(|&pct| point(strategy, pct, None)).collect()
}

/// Price-change x expiry grid. The strategy is re-priced at each expiry so
/// every row carries the premium it would actually cost at that tenor.
/// Output ascends by percentage, then by expiry.
pub fn expiry_grid(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    price_changes: &[f64],
    expiries: &[f64],
) -> EngineResult<Vec<ScenarioPoint>> {
    let pcts = sorted_axis("price change", price_changes)?;
    let days = sorted_axis("expiry", expiries)?;

    let strategies = days
        .iter()
        .map(|&d| strategy::build(spec, &ctx.with_days(d)?, model))
        .collect::<EngineResult<Vec<_>>>()?;

    let mut out = Vec::with_capacity(pcts.len() * days.len());
    for &pct in &pcts {
        for (s, &d) in strategies.iter().zip(days.iter()) {
            out.push(point(s, pct, Some(d))?);
        }
    }
    Ok(out)
}

/// Profit curve at `points` evenly spaced terminal prices in [lower, upper].
pub fn payoff_profile(
    strategy: &Strategy,
    lower: f64,
    upper: f64,
    points: usize,
) -> EngineResult<Vec<ProfilePoint>> {
    if !(lower > 0.0 && upper > lower && upper.is_finite()) {
        return Err(EngineError::InvalidInput(format!(
            "profile range must satisfy 0 < lower < upper, got {lower}..{upper}"
        )));
    }
    if !(2..=MAX_AXIS_POINTS).contains(&points) {
        return Err(EngineError::InvalidInput(format!(
            "profile points must be in 2..={MAX_AXIS_POINTS}, got {points}"
        )));
    }
    let step = (upper - lower) / (points - 1) as f64;
    Ok((0..points)
        .map(|i| {
            let price = lower + i as f64 * step;
            ProfilePoint {
                price,
                payoff: strategy.payoff_at(price),
                profit: strategy.profit_at(price),
            }
        })
        .collect())
}

/// Exact expected expiry profit under the risk-neutral GBM law:
/// E[payoff] of each leg is its price grown at the risk-free rate.
pub fn analytic_expected_profit(strategy: &Strategy) -> f64 {
    let growth = (strategy.rate * strategy.days_to_expiry / DAYS_PER_YEAR).exp();
    let expected_payoff: f64 = strategy
        .legs
        .iter()
        .map(|l| l.leg.position.sign() * l.leg.quantity as f64 * l.quote.price * growth)
        .sum();
    expected_payoff + strategy.net_premium
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use crate::strategy::StrategyKind;
    use approx::assert_abs_diff_eq;

    fn straddle() -> Strategy {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        strategy::build(&StrategySpec::default_for(StrategyKind::Straddle), &ctx, &BlackScholes::new())
            .unwrap()
    }

    #[test]
    fn test_grid_sorted_and_consistent() {
        let s = straddle();
        let pts = grid(&s, &[10.0, -10.0, 0.0]).unwrap();
        let pcts: Vec<f64> = pts.iter().map(|p| p.price_change_pct).collect();
        assert_eq!(pcts, vec![-10.0, 0.0, 10.0]);
        for p in &pts {
            assert_abs_diff_eq!(p.profit, p.payoff + s.net_premium, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(pts[0].final_price, 90.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[0].payoff, 10.0, epsilon = 1e-12);
        assert_eq!(pts[1].payoff, 0.0);
    }

    #[test]
    fn test_default_axis() {
        let axis = default_price_changes();
        assert_eq!(axis.len(), 13);
        assert_eq!(axis[0], -30.0);
        assert_eq!(axis[12], 30.0);
        assert_eq!(price_change_axis(-50.0, 50.0, 5.0).unwrap().len(), 21);
        assert!(price_change_axis(-50.0, 50.0, 0.0).is_err());
    }

    #[test]
    fn test_total_loss_rejected() {
        assert!(matches!(grid(&straddle(), &[-100.0]), Err(EngineError::InvalidInput(_))));
        assert!(grid(&straddle(), &[]).is_err());
    }

    #[test]
    fn test_expiry_grid_ordering_and_repricing() {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let spec = StrategySpec::default_for(StrategyKind::Straddle);
        let pts = expiry_grid(&spec, &ctx, &BlackScholes::new(), &[5.0, -5.0], &[60.0, 7.0]).unwrap();
        assert_eq!(pts.len(), 4);
        let keys: Vec<(f64, f64)> = pts
            .iter()
            .map(|p| (p.price_change_pct, p.days_to_expiry.unwrap()))
            .collect();
        assert_eq!(keys, vec![(-5.0, 7.0), (-5.0, 60.0), (5.0, 7.0), (5.0, 60.0)]);
        // Longer tenor costs more, so the same move earns less
        assert!(pts[0].profit > pts[1].profit);
        assert_eq!(pts[0].payoff, pts[1].payoff);
    }

    #[test]
    fn test_axis_lengths_are_capped() {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let spec = StrategySpec::default_for(StrategyKind::Straddle);
        let long: Vec<f64> = (0..=MAX_AXIS_POINTS).map(|i| i as f64).collect();
        let r = expiry_grid(&spec, &ctx, &BlackScholes::new(), &[0.0], &long);
        assert!(matches!(r, Err(EngineError::InvalidInput(_))));
        assert!(grid(&straddle(), &long).is_err());
        assert!(price_change_axis(-50.0, 50.0, 0.001).is_err());
        assert!(payoff_profile(&straddle(), 70.0, 130.0, MAX_AXIS_POINTS + 1).is_err());
        // Exactly at the cap is fine
        assert_eq!(grid(&straddle(), &long[..MAX_AXIS_POINTS]).unwrap().len(), MAX_AXIS_POINTS);
    }

    #[test]
    fn test_payoff_profile_endpoints() {
        let s = straddle();
        let prof = payoff_profile(&s, 70.0, 130.0, 100).unwrap();
        assert_eq!(prof.len(), 100);
        assert_abs_diff_eq!(prof[0].price, 70.0, epsilon = 1e-12);
        assert_abs_diff_eq!(prof[99].price, 130.0, epsilon = 1e-9);
        assert!(payoff_profile(&s, 130.0, 70.0, 10).is_err());
    }

    #[test]
    fn test_analytic_expectation_zero_rate() {
        // r = 0: expected payoff equals premium, so expected profit is 0
        let ctx = PricingContext::new(100.0, 0.0, 0.30, 30.0).unwrap();
        let s = strategy::build(&StrategySpec::default_for(StrategyKind::IronCondor), &ctx, &BlackScholes::new())
            .unwrap();
        assert_abs_diff_eq!(analytic_expected_profit(&s), 0.0, epsilon = 1e-12);
    }
}
