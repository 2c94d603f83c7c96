use crate::errors::{EngineError, EngineResult};
use crate::models::{ModelParams, PricingModel};
use crate::strategy::{BreakEvens, PricedLeg, PricingContext, Strategy, StrategyKind, StrategySpec};
use crate::types::{Greeks, OptionKind, OptionLeg, Position};
use smallvec::SmallVec;

/// Resolve the StrategySpec strikes against the context spot and price every leg.
pub fn build(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
) -> EngineResult<Strategy> {
    let strikes = spec.strikes_for(ctx.spot)?;
    from_strikes(spec.kind(), &strikes, spec.quantity(), ctx, model)
}

/// Price a strategy on already-resolved strikes (ascending). Used directly when
/// strikes must stay fixed while spot moves.
pub fn from_strikes(
    kind: StrategyKind,
    strikes: &[f64],
    quantity: u32,
    ctx: &PricingContext,
    model: &dyn PricingModel,
) -> EngineResult<Strategy> {
    let shape = leg_shape(kind, strikes)?;

    let mut legs: SmallVec<[PricedLeg; 4]> = SmallVec::new();
    let mut net_premium = 0.0;
    let mut greeks = Greeks::flat();
    for (option_kind, strike, position) in shape {
        let leg = OptionLeg::new(option_kind, strike, ctx.days_to_expiry, position, quantity)?;
        let params = ModelParams::new(ctx.spot, strike, ctx.days_to_expiry, ctx.volatility, ctx.rate)?;
        let quote = model.quote(option_kind, &params);

        let qty = quantity as f64;
        net_premium += position.premium_sign() * qty * quote.price;
        greeks = greeks.combine(&quote.greeks.scaled(position.sign() * qty));
        legs.push(PricedLeg { leg, quote });
    }

    let break_evens = break_evens(kind, strikes, net_premium, quantity as f64);

    Ok(Strategy {
        kind,
        model: model.name(),
        legs,
        spot: ctx.spot,
        rate: ctx.rate,
        volatility: ctx.volatility,
        days_to_expiry: ctx.days_to_expiry,
        net_premium,
        greeks,
        break_evens,
    })
}

type LegShape = SmallVec<[(OptionKind, f64, Position); 4]>;

fn leg_shape(kind: StrategyKind, strikes: &[f64]) -> EngineResult<LegShape> {
    let mut shape = LegShape::new();
    match (kind, strikes) {
        (StrategyKind::Straddle, &[k]) => {
            shape.push((OptionKind::Call, k, Position::Long));
            shape.push((OptionKind::Put, k, Position::Long));
        }
        (StrategyKind::Strangle, &[put, call]) => {
            if put >= call {
                return Err(EngineError::InvalidInput(format!(
                    "strangle put strike {put} must be below call strike {call}"
                )));
            }
            shape.push((OptionKind::Put, put, Position::Long));
            shape.push((OptionKind::Call, call, Position::Long));
        }
        (StrategyKind::IronCondor, &[k1, k2, k3, k4]) => {
            if !(k1 < k2 && k2 < k3 && k3 < k4) {
                return Err(EngineError::InvalidInput(format!(
                    "iron condor strikes must be strictly increasing, got {k1}/{k2}/{k3}/{k4}"
                )));
            }
            shape.push((OptionKind::Put, k1, Position::Long));
            shape.push((OptionKind::Put, k2, Position::Short));
            shape.push((OptionKind::Call, k3, Position::Short));
            shape.push((OptionKind::Call, k4, Position::Long));
        }
        (kind, strikes) => {
            return Err(EngineError::InvalidInput(format!(
                "{kind}: wrong number of strikes ({})",
                strikes.len()
            )));
        }
    }
    Ok(shape)
}

/// Expiry break-evens in closed form.
///
/// Long straddle/strangle: K_put - debit and K_call + debit (per unit).
/// Iron condor: K2 - credit and K3 + credit, valid only inside each wing;
/// a net debit condor never breaks even.
fn break_evens(kind: StrategyKind, strikes: &[f64], net_premium: f64, qty: f64) -> BreakEvens {
    let per_unit = net_premium / qty;
    match (kind, strikes) {
        (StrategyKind::Straddle, &[k]) => long_vol_break_evens(k, k, -per_unit),
        (StrategyKind::Strangle, &[put, call]) => long_vol_break_evens(put, call, -per_unit),
        (StrategyKind::IronCondor, &[k1, k2, k3, k4]) => {
            let credit = per_unit;
            if credit <= 0.0 {
                return BreakEvens::default();
            }
            BreakEvens {
                lower: (credit < k2 - k1).then_some(k2 - credit),
                upper: (credit < k4 - k3).then_some(k3 + credit),
            }
        }
        _ => BreakEvens::default(),
    }
}

fn long_vol_break_evens(put_strike: f64, call_strike: f64, debit: f64) -> BreakEvens {
    let lower = put_strike - debit;
    BreakEvens {
        lower: (lower > 0.0).then_some(lower),
        upper: Some(call_strike + debit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use approx::assert_abs_diff_eq;

    fn ctx() -> PricingContext {
        PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap()
    }

    fn built(kind: StrategyKind) -> Strategy {
        build(&StrategySpec::default_for(kind), &ctx(), &BlackScholes::new()).unwrap()
    }

    #[test]
    fn test_atm_straddle_premium_and_break_evens() {
        let s = built(StrategyKind::Straddle);
        let debit = s.position_value();
        assert_abs_diff_eq!(debit, 3.63 + 3.22, epsilon = 0.1);
        assert!(s.net_premium < 0.0, "long straddle is a debit");
        assert_abs_diff_eq!(s.break_evens.lower.unwrap(), 100.0 - debit, epsilon = 1e-12);
        assert_abs_diff_eq!(s.break_evens.upper.unwrap(), 100.0 + debit, epsilon = 1e-12);
        assert_eq!(s.summary().pricing_model, "Black-Scholes");
    }

    #[test]
    fn test_profit_is_zero_at_break_evens() {
        for kind in StrategyKind::ALL {
            let s = built(kind);
            for be in [s.break_evens.lower, s.break_evens.upper].into_iter().flatten() {
                assert!(s.profit_at(be).abs() < 1e-9, "{kind}: profit at {be} = {}", s.profit_at(be));
            }
        }
    }

    #[test]
    fn test_straddle_greeks_sum_legs() {
        let s = built(StrategyKind::Straddle);
        let sum_delta: f64 = s.legs.iter().map(|l| l.quote.greeks.delta).sum();
        assert_abs_diff_eq!(s.greeks.delta, sum_delta, epsilon = 1e-12);
        assert!(s.greeks.delta.abs() < 0.2, "ATM straddle is near delta-neutral");
        assert!(s.greeks.gamma.unwrap() > 0.0);
        assert!(s.greeks.vega > 0.0);
        assert!(s.greeks.theta.unwrap() < 0.0);
    }

    #[test]
    fn test_quantity_scales_everything() {
        let one = built(StrategyKind::Strangle);
        let spec = StrategySpec::Strangle {
            put_strike: None,
            call_strike: None,
            otm_offset: 0.05,
            quantity: 3,
        };
        let three = build(&spec, &ctx(), &BlackScholes::new()).unwrap();
        assert_abs_diff_eq!(three.net_premium, 3.0 * one.net_premium, epsilon = 1e-9);
        assert_abs_diff_eq!(three.greeks.vega, 3.0 * one.greeks.vega, epsilon = 1e-9);
        assert_abs_diff_eq!(three.break_evens.lower.unwrap(), one.break_evens.lower.unwrap(), epsilon = 1e-9);
        assert_abs_diff_eq!(three.break_evens.upper.unwrap(), one.break_evens.upper.unwrap(), epsilon = 1e-9);
    }

    #[test]
    fn test_condor_is_credit_with_bounded_risk() {
        let s = built(StrategyKind::IronCondor);
        assert!(s.net_premium > 0.0, "short condor collects credit");
        assert!(s.greeks.vega < 0.0);

        let max_profit = s.max_profit().unwrap();
        let max_loss = s.max_loss().unwrap();
        assert_abs_diff_eq!(max_profit, s.net_premium, epsilon = 1e-9);
        // wings are 5 wide
        assert_abs_diff_eq!(max_loss, 5.0 - s.net_premium, epsilon = 1e-9);

        let summary = s.summary();
        assert_abs_diff_eq!(summary.put_spread_width.unwrap(), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.call_spread_width.unwrap(), 5.0, epsilon = 1e-9);
        assert!(summary.profit_range_width.unwrap() > 20.0);
    }

    #[test]
    fn test_long_vol_has_unbounded_profit() {
        let s = built(StrategyKind::Straddle);
        assert!(s.max_profit().is_none());
        assert_abs_diff_eq!(s.max_loss().unwrap(), s.position_value(), epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_unordered_strikes() {
        let model = BlackScholes::new();
        let strangle = StrategySpec::Strangle {
            put_strike: Some(110.0),
            call_strike: Some(90.0),
            otm_offset: 0.05,
            quantity: 1,
        };
        assert!(matches!(build(&strangle, &ctx(), &model), Err(EngineError::InvalidInput(_))));

        let condor = StrategySpec::IronCondor {
            strikes: Some([90.0, 95.0, 95.0, 110.0]),
            center_offset: 0.1,
            put_wing_width: 0.05,
            call_wing_width: 0.05,
            quantity: 1,
        };
        assert!(build(&condor, &ctx(), &model).is_err());
    }

    #[test]
    fn test_debit_condor_has_no_break_evens() {
        let be = break_evens(StrategyKind::IronCondor, &[80.0, 90.0, 110.0, 120.0], -0.5, 1.0);
        assert_eq!(be, BreakEvens::default());
    }

    #[test]
    fn test_huge_debit_drops_lower_break_even() {
        let be = break_evens(StrategyKind::Straddle, &[10.0], -12.0, 1.0);
        assert!(be.lower.is_none());
        assert_eq!(be.upper, Some(22.0));
    }
}
