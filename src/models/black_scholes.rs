use crate::models::{ModelParams, PricingModel, DAYS_PER_YEAR};
use crate::types::{Greeks, OptionKind, OptionQuote};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Black-Scholes European option pricing with analytic Greeks.
///
/// call = S*N(d1) - K*e^{-rT}*N(d2)
/// put  = K*e^{-rT}*N(-d2) - S*N(-d1)
///
/// where d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma*sqrt(T)), d2 = d1 - sigma*sqrt(T).
///
/// Vega and rho are scaled to a 1 percentage point move, theta to one calendar day.
/// All computation uses precomputed ModelParams. No allocations.
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

impl BlackScholes {
    pub fn new() -> Self {
        let normal = Normal::new(0.0, 1.0).unwrap_or(Normal::standard());
        Self { normal }
    }

    /// Expired option: intrinsic value, step delta, no gamma/theta.
    fn expired(&self, kind: OptionKind, p: &ModelParams) -> OptionQuote {
        let call_delta = step(p.spot - p.strike);
        let delta = match kind {
            OptionKind::Call => call_delta,
            OptionKind::Put => call_delta - 1.0,
        };
        OptionQuote {
            price: kind.intrinsic(p.spot, p.strike),
            greeks: Greeks {
                delta,
                gamma: None,
                vega: 0.0,
                theta: None,
                rho: 0.0,
            },
        }
    }

    /// Zero volatility with time remaining: the forward is certain, so the
    /// option is worth its discounted-forward intrinsic value.
    fn deterministic(&self, kind: OptionKind, p: &ModelParams) -> OptionQuote {
        let pv_strike = p.strike * p.discount;
        // N(d1) and N(d2) both collapse to the same step
        let n = step(p.spot - pv_strike);
        let (price, delta, theta, rho) = match kind {
            OptionKind::Call => (
                (p.spot - pv_strike).max(0.0),
                n,
                -p.rate * pv_strike * n,
                pv_strike * p.ttl_years * n,
            ),
            OptionKind::Put => (
                (pv_strike - p.spot).max(0.0),
                n - 1.0,
                p.rate * pv_strike * (1.0 - n),
                -pv_strike * p.ttl_years * (1.0 - n),
            ),
        };
        OptionQuote {
            price,
            greeks: Greeks {
                delta,
                gamma: None,
                vega: 0.0,
                theta: Some(theta / DAYS_PER_YEAR),
                rho: rho / 100.0,
            },
        }
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingModel for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn quote(&self, kind: OptionKind, p: &ModelParams) -> OptionQuote {
        if p.is_expired() {
            return self.expired(kind, p);
        }
        if p.is_vol_degenerate() {
            return self.deterministic(kind, p);
        }

        let d1 = (p.ln_s_k + (p.rate + 0.5 * p.sigma * p.sigma) * p.ttl_years) / p.sigma_sqrt_t;
        let d2 = d1 - p.sigma_sqrt_t;

        let pdf_d1 = self.normal.pdf(d1);
        let pv_strike = p.strike * p.discount;

        // Shared by both sides
        let gamma = pdf_d1 / (p.spot * p.sigma_sqrt_t);
        let vega = p.spot * pdf_d1 * p.sqrt_t / 100.0;
        let decay = -p.spot * pdf_d1 * p.sigma / (2.0 * p.sqrt_t);

        let (price, delta, theta, rho) = match kind {
            OptionKind::Call => {
                let n_d1 = self.normal.cdf(d1);
                let n_d2 = self.normal.cdf(d2);
                (
                    p.spot * n_d1 - pv_strike * n_d2,
                    n_d1,
                    decay - p.rate * pv_strike * n_d2,
                    pv_strike * p.ttl_years * n_d2,
                )
            }
            OptionKind::Put => {
                let n_neg_d1 = self.normal.cdf(-d1);
                let n_neg_d2 = self.normal.cdf(-d2);
                (
                    pv_strike * n_neg_d2 - p.spot * n_neg_d1,
                    -n_neg_d1,
                    decay + p.rate * pv_strike * n_neg_d2,
                    -pv_strike * p.ttl_years * n_neg_d2,
                )
            }
        };

        OptionQuote {
            // Rounding can push deep OTM prices a hair below zero
            price: price.max(0.0),
            greeks: Greeks {
                delta,
                gamma: Some(gamma),
                vega,
                theta: Some(theta / DAYS_PER_YEAR),
                rho: rho / 100.0,
            },
        }
    }
}

/// Limit of N(x / eps) as eps -> 0.
#[inline]
fn step(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        0.0
    } else {
        0.5
    }
}
