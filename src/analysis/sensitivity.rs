use crate::errors::{EngineError, EngineResult};
use crate::models::{PricingModel, DAYS_PER_YEAR, TIME_EPSILON};
use crate::strategy::{self, PricingContext, StrategySpec};

/// Upper bound on points per sweep.
pub const MAX_SWEEP_STEPS: usize = 500;

/// Points in the default time sweep (fewer when expiry is closer).
pub const DEFAULT_TIME_POINTS: usize = 20;

/// Last point of the time sweep. Half the expiry epsilon, so the final
/// re-price lands in the intrinsic-value branch.
pub const EXPIRY_CLAMP_DAYS: f64 = TIME_EPSILON * DAYS_PER_YEAR * 0.5;

/// Multipliers of the base value, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SweepRange {
    pub lower: f64,
    pub upper: f64,
    pub steps: usize,
}

impl SweepRange {
    pub const VOLATILITY: Self = Self { lower: 0.5, upper: 1.5, steps: 20 };
    pub const SPOT: Self = Self { lower: 0.8, upper: 1.2, steps: 30 };

    pub fn new(lower: f64, upper: f64, steps: usize) -> EngineResult<Self> {
        let range = Self { lower, upper, steps };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.lower > 0.0 && self.upper > self.lower && self.upper.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "sweep range must satisfy 0 < lower < upper, got {}..{}",
                self.lower, self.upper
            )));
        }
        if !(2..=MAX_SWEEP_STEPS).contains(&self.steps) {
            return Err(EngineError::InvalidInput(format!(
                "sweep steps must be in 2..={MAX_SWEEP_STEPS}, got {}",
                self.steps
            )));
        }
        Ok(())
    }

    /// Ascending sample values around `base`.
    pub fn values(&self, base: f64) -> Vec<f64> {
        let span = self.upper - self.lower;
        let last = (self.steps - 1) as f64;
        (0..self.steps)
            .map(|i| base * (self.lower + span * i as f64 / last))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct VolatilityPoint {
    pub volatility: f64,
    pub price: f64,
    pub vega: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SpotPoint {
    pub spot: f64,
    pub price: f64,
    pub delta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TimePoint {
    pub days: f64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SensitivityReport {
    pub volatility: Vec<VolatilityPoint>,
    pub spot: Vec<SpotPoint>,
    pub time: Vec<TimePoint>,
}

/// Re-price with sigma swept over `range`, everything else at base.
pub fn volatility_sweep(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    range: &SweepRange,
) -> EngineResult<Vec<VolatilityPoint>> {
    range.validate()?;
    let strikes = spec.strikes_for(ctx.spot)?;
    range
        .values(ctx.volatility)
        .into_iter()
        .map(|sigma| {
            let s = strategy::from_strikes(spec.kind(), &strikes, spec.quantity(), &ctx.with_volatility(sigma)?, model)?;
            Ok(VolatilityPoint {
                volatility: sigma,
                price: s.position_value(),
                vega: s.greeks.vega,
            })
        })
        .collect()
}

/// Re-price with spot swept over `range`. Strikes stay where they were
/// placed at the base spot.
pub fn spot_sweep(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    range: &SweepRange,
) -> EngineResult<Vec<SpotPoint>> {
    range.validate()?;
    let strikes = spec.strikes_for(ctx.spot)?;
    range
        .values(ctx.spot)
        .into_iter()
        .map(|spot| {
            let s = strategy::from_strikes(spec.kind(), &strikes, spec.quantity(), &ctx.with_spot(spot)?, model)?;
            Ok(SpotPoint {
                spot,
                price: s.position_value(),
                delta: s.greeks.delta,
                gamma: s.greeks.gamma,
            })
        })
        .collect()
}

/// Re-price as expiry runs down from the base days to the clamp.
/// Ascending by days, so the first point is the clamp (intrinsic value).
pub fn time_sweep(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    points: usize,
) -> EngineResult<Vec<TimePoint>> {
    if !(2..=MAX_SWEEP_STEPS).contains(&points) {
        return Err(EngineError::InvalidInput(format!(
            "time sweep points must be in 2..={MAX_SWEEP_STEPS}, got {points}"
        )));
    }
    let strikes = spec.strikes_for(ctx.spot)?;
    let last = (points - 1) as f64;
    (0..points)
        .map(|i| {
            let days = (ctx.days_to_expiry * i as f64 / last).max(EXPIRY_CLAMP_DAYS);
            let s = strategy::from_strikes(spec.kind(), &strikes, spec.quantity(), &ctx.with_days(days)?, model)?;
            Ok(TimePoint {
                days,
                price: s.position_value(),
                theta: s.greeks.theta,
            })
        })
        .collect()
}

/// Time sweep length for a given expiry: one point per day, at most
/// `DEFAULT_TIME_POINTS`.
pub fn default_time_points(days_to_expiry: f64) -> usize {
    (days_to_expiry.round() as usize).clamp(2, DEFAULT_TIME_POINTS)
}

/// All three sweeps with default ranges.
pub fn analyze(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
) -> EngineResult<SensitivityReport> {
    analyze_with(
        spec,
        ctx,
        model,
        &SweepRange::VOLATILITY,
        &SweepRange::SPOT,
        default_time_points(ctx.days_to_expiry),
    )
}

/// All three sweeps with caller-chosen ranges.
pub fn analyze_with(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    volatility: &SweepRange,
    spot: &SweepRange,
    time_points: usize,
) -> EngineResult<SensitivityReport> {
    let report = SensitivityReport {
        volatility: volatility_sweep(spec, ctx, model, volatility)?,
        spot: spot_sweep(spec, ctx, model, spot)?,
        time: time_sweep(spec, ctx, model, time_points)?,
    };
    tracing::debug!(
        kind = %spec.kind(),
        vol_points = report.volatility.len(),
        spot_points = report.spot.len(),
        time_points = report.time.len(),
        "sensitivity sweeps done"
    );
    Ok(report)
}
