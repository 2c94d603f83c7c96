pub mod builder;

pub use builder::{build, from_strikes};

use crate::errors::{ensure_finite, ensure_positive, EngineError, EngineResult};
use crate::types::{Greeks, OptionKind, OptionLeg, OptionQuote, Position};
use smallvec::SmallVec;

// ── Strategy kinds and specs ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Straddle,
    Strangle,
    IronCondor,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::Straddle, Self::Strangle, Self::IronCondor];
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Straddle => write!(f, "straddle"),
            Self::Strangle => write!(f, "strangle"),
            Self::IronCondor => write!(f, "iron_condor"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "straddle" => Ok(Self::Straddle),
            "strangle" => Ok(Self::Strangle),
            "iron_condor" | "ironcondor" | "condor" => Ok(Self::IronCondor),
            other => Err(EngineError::InvalidInput(format!("unknown strategy kind: {other}"))),
        }
    }
}

fn one() -> u32 {
    1
}
fn default_otm_offset() -> f64 {
    0.05
}
fn default_center_offset() -> f64 {
    0.10
}
fn default_wing_width() -> f64 {
    0.05
}

/// How to place the strikes. Offsets and widths are fractions of spot.
/// Explicit strikes, when given, win over offsets.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    Straddle {
        #[serde(default)]
        strike: Option<f64>,
        #[serde(default = "one")]
        quantity: u32,
    },
    Strangle {
        #[serde(default)]
        put_strike: Option<f64>,
        #[serde(default)]
        call_strike: Option<f64>,
        #[serde(default = "default_otm_offset")]
        otm_offset: f64,
        #[serde(default = "one")]
        quantity: u32,
    },
    IronCondor {
        #[serde(default)]
        strikes: Option<[f64; 4]>,
        #[serde(default = "default_center_offset")]
        center_offset: f64,
        #[serde(default = "default_wing_width")]
        put_wing_width: f64,
        #[serde(default = "default_wing_width")]
        call_wing_width: f64,
        #[serde(default = "one")]
        quantity: u32,
    },
}

impl StrategySpec {
    /// Spot-relative defaults: ATM straddle, 5% OTM strangle,
    /// condor shorts 10% out with 5% wings.
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Straddle => Self::Straddle { strike: None, quantity: 1 },
            StrategyKind::Strangle => Self::Strangle {
                put_strike: None,
                call_strike: None,
                otm_offset: default_otm_offset(),
                quantity: 1,
            },
            StrategyKind::IronCondor => Self::IronCondor {
                strikes: None,
                center_offset: default_center_offset(),
                put_wing_width: default_wing_width(),
                call_wing_width: default_wing_width(),
                quantity: 1,
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Straddle { .. } => StrategyKind::Straddle,
            Self::Strangle { .. } => StrategyKind::Strangle,
            Self::IronCondor { .. } => StrategyKind::IronCondor,
        }
    }

    pub fn quantity(&self) -> u32 {
        match *self {
            Self::Straddle { quantity, .. }
            | Self::Strangle { quantity, .. }
            | Self::IronCondor { quantity, .. } => quantity,
        }
    }

    /// Same shape with explicit strikes dropped, so strikes follow spot.
    pub fn spot_relative(&self) -> Self {
        match *self {
            Self::Straddle { quantity, .. } => Self::Straddle { strike: None, quantity },
            Self::Strangle { otm_offset, quantity, .. } => Self::Strangle {
                put_strike: None,
                call_strike: None,
                otm_offset,
                quantity,
            },
            Self::IronCondor { center_offset, put_wing_width, call_wing_width, quantity, .. } => {
                Self::IronCondor {
                    strikes: None,
                    center_offset,
                    put_wing_width,
                    call_wing_width,
                    quantity,
                }
            }
        }
    }

    /// Resolve strikes (ascending) for a given spot.
    pub fn strikes_for(&self, spot: f64) -> EngineResult<SmallVec<[f64; 4]>> {
        ensure_positive("spot", spot)?;
        let mut out: SmallVec<[f64; 4]> = SmallVec::new();
        match *self {
            Self::Straddle { strike, .. } => out.push(strike.unwrap_or(spot)),
            Self::Strangle { put_strike, call_strike, otm_offset, .. } => {
                check_fraction("otm_offset", otm_offset)?;
                out.push(put_strike.unwrap_or(spot * (1.0 - otm_offset)));
                out.push(call_strike.unwrap_or(spot * (1.0 + otm_offset)));
            }
            Self::IronCondor {
                strikes,
                center_offset,
                put_wing_width,
                call_wing_width,
                ..
            } => match strikes {
                Some(k) => out.extend_from_slice(&k),
                None => {
                    check_fraction("center_offset", center_offset)?;
                    check_fraction("put_wing_width", put_wing_width)?;
                    check_fraction("call_wing_width", call_wing_width)?;
                    let short_put = spot * (1.0 - center_offset);
                    let short_call = spot * (1.0 + center_offset);
                    out.push(short_put - spot * put_wing_width);
                    out.push(short_put);
                    out.push(short_call);
                    out.push(short_call + spot * call_wing_width);
                }
            },
        }
        Ok(out)
    }
}

fn check_fraction(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!("{name} must be in (0, 1), got {value}")))
    }
}

// ── Pricing context ──

/// The market inputs a strategy is priced against.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricingContext {
    pub spot: f64,
    pub rate: f64,
    pub volatility: f64,
    pub days_to_expiry: f64,
}

impl PricingContext {
    pub fn new(spot: f64, rate: f64, volatility: f64, days_to_expiry: f64) -> EngineResult<Self> {
        ensure_positive("spot", spot)?;
        ensure_finite("rate", rate)?;
        ensure_positive("days_to_expiry", days_to_expiry)?;
        if !volatility.is_finite() || volatility < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "volatility must be >= 0, got {volatility}"
            )));
        }
        Ok(Self { spot, rate, volatility, days_to_expiry })
    }

    pub fn with_spot(&self, spot: f64) -> EngineResult<Self> {
        Self::new(spot, self.rate, self.volatility, self.days_to_expiry)
    }

    pub fn with_volatility(&self, volatility: f64) -> EngineResult<Self> {
        Self::new(self.spot, self.rate, volatility, self.days_to_expiry)
    }

    pub fn with_days(&self, days_to_expiry: f64) -> EngineResult<Self> {
        Self::new(self.spot, self.rate, self.volatility, days_to_expiry)
    }
}

// ── Priced strategy ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricedLeg {
    pub leg: OptionLeg,
    pub quote: OptionQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct BreakEvens {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// A fully priced multi-leg position. Built once by `builder`, never mutated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Strategy {
    pub kind: StrategyKind,
    /// Name of the pricing model the legs were quoted with.
    pub model: &'static str,
    pub legs: SmallVec<[PricedLeg; 4]>,
    pub spot: f64,
    pub rate: f64,
    pub volatility: f64,
    pub days_to_expiry: f64,
    /// Entry cash flow: negative = debit paid, positive = credit received.
    pub net_premium: f64,
    /// Position Greeks (signed by long/short, scaled by quantity).
    pub greeks: Greeks,
    pub break_evens: BreakEvens,
}

/// call price, put price, total cost and aggregated Greeks.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PricingResult {
    pub call_price: f64,
    pub put_price: f64,
    pub total_cost: f64,
    pub is_credit: bool,
    pub greeks: Greeks,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StrategySummary {
    pub strategy: StrategyKind,
    pub pricing_model: &'static str,
    pub spot_price: f64,
    pub strikes: Vec<f64>,
    pub days_to_expiry: f64,
    pub volatility: f64,
    pub risk_free_rate: f64,
    pub call_price: f64,
    pub put_price: f64,
    pub net_premium: f64,
    pub total_cost: f64,
    /// None = unbounded.
    pub max_profit: Option<f64>,
    /// Magnitude of the worst outcome. None = unbounded.
    pub max_loss: Option<f64>,
    pub lower_break_even: Option<f64>,
    pub upper_break_even: Option<f64>,
    pub required_move_lower_pct: Option<f64>,
    pub required_move_upper_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_range_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_range_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_spread_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_spread_width: Option<f64>,
    pub greeks: Greeks,
}

impl Strategy {
    /// Signed payoff of all legs at a terminal price (no premium).
    #[inline]
    pub fn payoff_at(&self, terminal: f64) -> f64 {
        self.legs.iter().map(|l| l.leg.payoff_at(terminal)).sum()
    }

    /// Profit at expiry: payoff minus premium paid (plus credit received).
    #[inline]
    pub fn profit_at(&self, terminal: f64) -> f64 {
        self.payoff_at(terminal) + self.net_premium
    }

    /// Mark value of the position (what it costs to put on).
    #[inline]
    pub fn position_value(&self) -> f64 {
        -self.net_premium
    }

    pub fn strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<f64> = self.legs.iter().map(|l| l.leg.strike).collect();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup();
        strikes
    }

    fn gross_price(&self, kind: OptionKind) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.leg.kind == kind)
            .map(|l| l.quote.price * l.leg.quantity as f64)
            .sum()
    }

    /// Slope of the expiry payoff beyond the highest strike.
    fn upside_slope(&self) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.leg.kind == OptionKind::Call)
            .map(|l| l.leg.position.sign() * l.leg.quantity as f64)
            .sum()
    }

    /// Profit at price 0 and at every strike. The expiry profit is piecewise
    /// linear between these points, so extremes live here (or at infinity).
    fn kink_profits(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(0.0)
            .chain(self.legs.iter().map(|l| l.leg.strike))
            .map(|s| self.profit_at(s))
    }

    pub fn max_profit(&self) -> Option<f64> {
        if self.upside_slope() > 0.0 {
            return None;
        }
        self.kink_profits().reduce(f64::max)
    }

    pub fn max_loss(&self) -> Option<f64> {
        if self.upside_slope() < 0.0 {
            return None;
        }
        self.kink_profits().reduce(f64::min).map(|worst| (-worst).max(0.0))
    }

    pub fn pricing_result(&self) -> PricingResult {
        PricingResult {
            call_price: self.gross_price(OptionKind::Call),
            put_price: self.gross_price(OptionKind::Put),
            total_cost: self.net_premium.abs(),
            is_credit: self.net_premium > 0.0,
            greeks: self.greeks,
        }
    }

    fn leg_strike(&self, kind: OptionKind, position: Position) -> Option<f64> {
        self.legs
            .iter()
            .find(|l| l.leg.kind == kind && l.leg.position == position)
            .map(|l| l.leg.strike)
    }

    pub fn summary(&self) -> StrategySummary {
        let pricing = self.pricing_result();
        let move_pct = |be: Option<f64>| be.map(|b| (b - self.spot).abs() / self.spot * 100.0);

        let (profit_range_width, profit_range_pct, put_spread_width, call_spread_width) =
            if self.kind == StrategyKind::IronCondor {
                let width = match (self.break_evens.lower, self.break_evens.upper) {
                    (Some(lo), Some(hi)) => Some(hi - lo),
                    _ => None,
                };
                let put_spread = self
                    .leg_strike(OptionKind::Put, Position::Short)
                    .zip(self.leg_strike(OptionKind::Put, Position::Long))
                    .map(|(short, long)| short - long);
                let call_spread = self
                    .leg_strike(OptionKind::Call, Position::Long)
                    .zip(self.leg_strike(OptionKind::Call, Position::Short))
                    .map(|(long, short)| long - short);
                (width, width.map(|w| w / self.spot * 100.0), put_spread, call_spread)
            } else {
                (None, None, None, None)
            };

        StrategySummary {
            strategy: self.kind,
            pricing_model: self.model,
            spot_price: self.spot,
            strikes: self.strikes(),
            days_to_expiry: self.days_to_expiry,
            volatility: self.volatility,
            risk_free_rate: self.rate,
            call_price: pricing.call_price,
            put_price: pricing.put_price,
            net_premium: self.net_premium,
            total_cost: self.position_value(),
            max_profit: self.max_profit(),
            max_loss: self.max_loss(),
            lower_break_even: self.break_evens.lower,
            upper_break_even: self.break_evens.upper,
            required_move_lower_pct: move_pct(self.break_evens.lower),
            required_move_upper_pct: move_pct(self.break_evens.upper),
            profit_range_width,
            profit_range_pct,
            put_spread_width,
            call_spread_width,
            greeks: self.greeks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("straddle".parse::<StrategyKind>().unwrap(), StrategyKind::Straddle);
        assert_eq!("Iron_Condor".parse::<StrategyKind>().unwrap(), StrategyKind::IronCondor);
        assert!(matches!(
            "butterfly".parse::<StrategyKind>(),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_spec_json_defaults() {
        let spec: StrategySpec = serde_json::from_str(r#"{"kind":"strangle"}"#).unwrap();
        assert_eq!(spec, StrategySpec::default_for(StrategyKind::Strangle));
        let spec: StrategySpec =
            serde_json::from_str(r#"{"kind":"straddle","strike":105.0,"quantity":3}"#).unwrap();
        assert_eq!(spec.quantity(), 3);
        assert_eq!(spec.strikes_for(100.0).unwrap().as_slice(), &[105.0]);
    }

    #[test]
    fn test_default_condor_strikes() {
        let strikes = StrategySpec::default_for(StrategyKind::IronCondor)
            .strikes_for(200.0)
            .unwrap();
        let expected = [170.0, 180.0, 220.0, 230.0];
        for (got, want) in strikes.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "strike {got} != {want}");
        }
    }

    #[test]
    fn test_spot_relative_drops_explicit_strikes() {
        let spec = StrategySpec::Straddle { strike: Some(90.0), quantity: 2 };
        let rel = spec.spot_relative();
        assert_eq!(rel.strikes_for(120.0).unwrap().as_slice(), &[120.0]);
        assert_eq!(rel.quantity(), 2);
    }

    #[test]
    fn test_bad_offset_rejected() {
        let spec = StrategySpec::Strangle {
            put_strike: None,
            call_strike: None,
            otm_offset: 1.5,
            quantity: 1,
        };
        assert!(spec.strikes_for(100.0).is_err());
    }

    #[test]
    fn test_context_validation() {
        assert!(PricingContext::new(100.0, 0.05, 0.3, 30.0).is_ok());
        assert!(PricingContext::new(100.0, 0.05, 0.3, 0.0).is_err());
        assert!(PricingContext::new(-5.0, 0.05, 0.3, 30.0).is_err());
        assert!(PricingContext::new(100.0, 0.05, -0.3, 30.0).is_err());
    }
}
