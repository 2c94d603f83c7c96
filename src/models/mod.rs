pub mod black_scholes;
pub mod volatility;

use crate::errors::{ensure_finite, ensure_positive, EngineError, EngineResult};
use crate::types::{OptionKind, OptionQuote};

/// Calendar days per year used to turn days-to-expiry into T.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// At or below this T (years) an option is treated as expired:
/// intrinsic value, no gamma/theta.
pub const TIME_EPSILON: f64 = 1e-6;

/// At or below this sigma the price collapses to its discounted-forward limit.
pub const VOL_EPSILON: f64 = 1e-12;

/// All pricing models implement this trait.
/// quote() must be a pure function: deterministic output from inputs only.
/// Send + Sync required so engines can share one instance across rayon workers.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Price and Greeks for one unit of a European option.
    fn quote(&self, kind: OptionKind, params: &ModelParams) -> OptionQuote;
}

// ── Precomputed model parameters (stack, no alloc) ──

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ModelParams {
    pub spot: f64,
    pub strike: f64,
    pub ttl_years: f64,
    pub sigma: f64,
    pub rate: f64,
    // Precomputed
    pub ln_s_k: f64,
    pub sqrt_t: f64,
    pub sigma_sqrt_t: f64,
    pub discount: f64,
}

impl ModelParams {
    /// Validates once so the model itself never has to.
    /// `days` may be 0 (evaluation at expiry); sigma may be 0 (degenerate, not an error).
    pub fn new(spot: f64, strike: f64, days: f64, sigma: f64, rate: f64) -> EngineResult<Self> {
        ensure_positive("spot", spot)?;
        ensure_positive("strike", strike)?;
        ensure_finite("rate", rate)?;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(EngineError::InvalidInput(format!("volatility must be >= 0, got {sigma}")));
        }
        if !days.is_finite() || days < 0.0 {
            return Err(EngineError::InvalidInput(format!("days to expiry must be >= 0, got {days}")));
        }

        let ttl_years = days / DAYS_PER_YEAR;
        let sqrt_t = ttl_years.sqrt();
        Ok(Self {
            spot,
            strike,
            ttl_years,
            sigma,
            rate,
            ln_s_k: (spot / strike).ln(),
            sqrt_t,
            sigma_sqrt_t: sigma * sqrt_t,
            discount: (-rate * ttl_years).exp(),
        })
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.ttl_years <= TIME_EPSILON
    }

    #[inline]
    pub fn is_vol_degenerate(&self) -> bool {
        self.sigma <= VOL_EPSILON
    }
}
