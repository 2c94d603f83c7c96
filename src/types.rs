use crate::errors::{ensure_positive, EngineError, EngineResult};
use crate::models::volatility;
use chrono::NaiveDate;

// ── Option legs ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Payoff of one unit at expiry.
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Long,
    Short,
}

impl Position {
    /// Exposure sign: +1 long, -1 short. Applies to payoff and Greeks.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// Cash-flow sign at entry: a long leg costs premium, a short leg collects it.
    #[inline]
    pub fn premium_sign(self) -> f64 {
        -self.sign()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptionLeg {
    pub kind: OptionKind,
    pub strike: f64,
    pub days_to_expiry: f64,
    pub position: Position,
    pub quantity: u32,
}

impl OptionLeg {
    pub fn new(
        kind: OptionKind,
        strike: f64,
        days_to_expiry: f64,
        position: Position,
        quantity: u32,
    ) -> EngineResult<Self> {
        ensure_positive("strike", strike)?;
        ensure_positive("days_to_expiry", days_to_expiry)?;
        if quantity == 0 {
            return Err(EngineError::invalid("quantity must be >= 1"));
        }
        Ok(Self { kind, strike, days_to_expiry, position, quantity })
    }

    /// Signed payoff of the whole leg at a terminal price.
    #[inline]
    pub fn payoff_at(&self, terminal: f64) -> f64 {
        self.position.sign() * self.quantity as f64 * self.kind.intrinsic(terminal, self.strike)
    }
}

// ── Greeks ──

/// Analytic sensitivities. `gamma` and `theta` scale with 1/sqrt(T) and are
/// `None` when T is at or below the time epsilon.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct Greeks {
    pub delta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    /// Per 1 percentage point of volatility.
    pub vega: f64,
    /// Per calendar day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    /// Per 1 percentage point of rate.
    pub rho: f64,
}

impl Greeks {
    /// Zero exposure; the identity for `combine`.
    pub fn flat() -> Self {
        Self {
            delta: 0.0,
            gamma: Some(0.0),
            vega: 0.0,
            theta: Some(0.0),
            rho: 0.0,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma.map(|g| g * factor),
            vega: self.vega * factor,
            theta: self.theta.map(|t| t * factor),
            rho: self.rho * factor,
        }
    }

    /// Sum of two exposures. An undefined Greek on either side stays undefined.
    pub fn combine(&self, other: &Greeks) -> Self {
        Self {
            delta: self.delta + other.delta,
            gamma: self.gamma.zip(other.gamma).map(|(a, b)| a + b),
            vega: self.vega + other.vega,
            theta: self.theta.zip(other.theta).map(|(a, b)| a + b),
            rho: self.rho + other.rho,
        }
    }
}

/// Price and Greeks for one unit of one option.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct OptionQuote {
    pub price: f64,
    pub greeks: Greeks,
}

// ── Market snapshot ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Everything the engines need to know about an underlying for one request.
/// Owned by the caller; engines only borrow it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: String,
    pub spot: f64,
    pub previous_close: Option<f64>,
    pub day_change: f64,
    pub day_change_pct: f64,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub risk_free_rate: f64,
    #[serde(skip)]
    pub history: Vec<PricePoint>,
}

/// Minimum number of closes before a volatility estimate is trusted.
pub const MIN_HISTORY_FOR_VOL: usize = 30;

impl MarketSnapshot {
    #[inline]
    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.close).collect()
    }

    /// Annualized realized volatility over the most recent `lookback` closes.
    pub fn historical_volatility(&self, lookback: usize) -> EngineResult<f64> {
        if self.history.len() < MIN_HISTORY_FOR_VOL {
            return Err(EngineError::DataUnavailable(format!(
                "not enough history for {} ({} closes, need {MIN_HISTORY_FOR_VOL})",
                self.ticker,
                self.history.len()
            )));
        }
        let closes = self.closes();
        let start = closes.len().saturating_sub(lookback.max(2));
        let sigma = volatility::realized_volatility(&closes[start..]);
        if sigma <= 0.0 {
            return Err(EngineError::DataUnavailable(format!(
                "flat price history for {}, volatility undefined",
                self.ticker
            )));
        }
        Ok(sigma)
    }
}
