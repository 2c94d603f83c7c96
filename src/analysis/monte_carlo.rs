use crate::analysis::stats::{self, Outcomes, Ratio};
use crate::errors::{ensure_positive, EngineError, EngineResult};
use crate::models::{PricingModel, DAYS_PER_YEAR};
use crate::strategy::{self, PricingContext, Strategy, StrategySpec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

/// Draws per rayon task. Fixed so the chunk -> seed mapping, and therefore
/// the output, does not depend on the thread count.
pub const CHUNK_SIZE: usize = 8192;

pub const MAX_SIMULATIONS: usize = 1_000_000;

/// VaR confidence level, percent.
pub const VAR_CONFIDENCE_PCT: f64 = 95.0;

pub const DEFAULT_STRIKE_POINTS: usize = 20;
pub const MAX_STRIKE_POINTS: usize = 200;

/// Risk-neutral GBM terminal price law:
/// S_T = S0 * exp((r - sigma^2/2) T + sigma sqrt(T) Z)
#[derive(Debug, Clone, Copy)]
pub struct GbmTerminal {
    spot: f64,
    drift: f64,
    diffusion: f64,
}

impl GbmTerminal {
    pub fn new(spot: f64, rate: f64, sigma: f64, days: f64) -> EngineResult<Self> {
        ensure_positive("spot", spot)?;
        if !sigma.is_finite() || sigma < 0.0 || !days.is_finite() || days < 0.0 || !rate.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "bad GBM inputs: sigma={sigma}, days={days}, rate={rate}"
            )));
        }
        let t = days / DAYS_PER_YEAR;
        Ok(Self {
            spot,
            drift: (rate - 0.5 * sigma * sigma) * t,
            diffusion: sigma * t.sqrt(),
        })
    }

    pub fn for_strategy(strategy: &Strategy) -> EngineResult<Self> {
        Self::new(strategy.spot, strategy.rate, strategy.volatility, strategy.days_to_expiry)
    }

    #[inline(always)]
    pub fn terminal(&self, z: f64) -> f64 {
        self.spot * (self.drift + self.diffusion * z).exp()
    }
}

/// Draw `n` terminal prices from a caller-owned generator.
pub fn simulate_terminal_prices<R: Rng + ?Sized>(gbm: &GbmTerminal, n: usize, rng: &mut R) -> Vec<f64> {
    (0..n)
        .map(|_| {
            let z: f64 = StandardNormal.sample(&mut *rng);
            gbm.terminal(z)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationConfig {
    pub num_simulations: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { num_simulations: 10_000, seed: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MonteCarloResult {
    pub num_simulations: usize,
    pub probability_of_profit: f64,
    pub probability_of_loss: f64,
    pub expected_profit: f64,
    pub median_profit: f64,
    pub std_profit: f64,
    /// Mean winning draw over |mean losing draw|.
    pub risk_reward_ratio: Ratio,
    /// Mean of the winning draws (0 if none).
    pub expected_gain: f64,
    /// Mean of the losing draws (0 if none). Negative.
    pub expected_loss: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VaRResult {
    pub confidence_level: f64,
    /// Profit quantile at 1 - confidence. Negative means a loss.
    pub var: f64,
    /// Mean of draws at or below `var`. Always <= `var`.
    pub cvar: f64,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BreakevenAnalysis {
    pub lower_break_even: Option<f64>,
    pub upper_break_even: Option<f64>,
    pub prob_below_lower: f64,
    pub prob_above_upper: f64,
    pub prob_between: f64,
    pub prob_profitable: f64,
}

/// All three analyses, computed from one sample set.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MonteCarloReport {
    /// Seed that reproduces this run. None when the caller supplied the generator.
    pub seed: Option<u64>,
    pub summary: MonteCarloResult,
    pub var: VaRResult,
    pub breakeven: BreakevenAnalysis,
}

fn check_count(n: usize) -> EngineResult<()> {
    if (1..=MAX_SIMULATIONS).contains(&n) {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "num_simulations must be in 1..={MAX_SIMULATIONS}, got {n}"
        )))
    }
}

#[inline]
fn chunk_seed(seed: u64, chunk: usize) -> u64 {
    seed.wrapping_add((chunk as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// `n` terminal prices in fixed-size chunks across the rayon pool,
/// concatenated in chunk order.
fn draw_terminals(gbm: &GbmTerminal, n: usize, seed: u64) -> Vec<f64> {
    (0..n.div_ceil(CHUNK_SIZE))
        .into_par_iter()
        .map(|c| {
            let len = CHUNK_SIZE.min(n - c * CHUNK_SIZE);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, c));
            simulate_terminal_prices(gbm, len, &mut rng)
        })
        .collect::<Vec<_>>()
        .concat()
}

/// Parallel, chunked run. Same seed and N give bit-identical output.
pub fn analyze(strategy: &Strategy, config: &SimulationConfig) -> EngineResult<MonteCarloReport> {
    check_count(config.num_simulations)?;
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let n = config.num_simulations;

    let report = if n <= CHUNK_SIZE {
        // One chunk: the sequential path draws exactly the same sample.
        let mut rng = StdRng::seed_from_u64(chunk_seed(seed, 0));
        MonteCarloReport {
            seed: Some(seed),
            ..analyze_with_rng(strategy, n, &mut rng)?
        }
    } else {
        let gbm = GbmTerminal::for_strategy(strategy)?;
        summarize(strategy, &draw_terminals(&gbm, n, seed), Some(seed))
    };
    tracing::debug!(
        kind = %strategy.kind,
        n,
        seed,
        pop = report.summary.probability_of_profit,
        "monte carlo done"
    );
    Ok(report)
}

/// Sequential run on a caller-owned generator.
pub fn analyze_with_rng<R: Rng + ?Sized>(
    strategy: &Strategy,
    n: usize,
    rng: &mut R,
) -> EngineResult<MonteCarloReport> {
    check_count(n)?;
    let gbm = GbmTerminal::for_strategy(strategy)?;
    let terminals = simulate_terminal_prices(&gbm, n, rng);
    Ok(summarize(strategy, &terminals, None))
}

fn summarize(strategy: &Strategy, terminals: &[f64], seed: Option<u64>) -> MonteCarloReport {
    let profits: Vec<f64> = terminals.iter().map(|&s| strategy.profit_at(s)).collect();
    let sorted = stats::sorted(&profits);
    let outcomes = Outcomes::count(&profits);

    let (expected_gain, expected_loss, risk_reward_ratio) = gain_loss(&profits);

    let summary = MonteCarloResult {
        num_simulations: profits.len(),
        probability_of_profit: outcomes.win_fraction(),
        probability_of_loss: outcomes.loss_fraction(),
        expected_profit: stats::mean(&profits),
        median_profit: stats::median(&sorted),
        std_profit: stats::std_dev(&profits),
        risk_reward_ratio,
        expected_gain,
        expected_loss,
        max_profit: sorted.last().copied().unwrap_or(0.0),
        max_loss: sorted.first().copied().unwrap_or(0.0),
        percentiles: Percentiles {
            p5: stats::percentile(&sorted, 5.0),
            p25: stats::percentile(&sorted, 25.0),
            p50: stats::percentile(&sorted, 50.0),
            p75: stats::percentile(&sorted, 75.0),
            p95: stats::percentile(&sorted, 95.0),
        },
    };

    MonteCarloReport {
        seed,
        var: value_at_risk(&sorted),
        breakeven: breakeven_analysis(strategy, terminals, outcomes),
        summary,
    }
}

/// Mean winning draw, mean losing draw and their ratio.
fn gain_loss(profits: &[f64]) -> (f64, f64, Ratio) {
    let gains: Vec<f64> = profits.iter().copied().filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = profits.iter().copied().filter(|&p| p < 0.0).collect();
    let gain = stats::mean(&gains);
    let loss = stats::mean(&losses);
    let ratio = if losses.is_empty() { Ratio::NoDownside } else { Ratio::of(gain, loss) };
    (gain, loss, ratio)
}

fn value_at_risk(sorted: &[f64]) -> VaRResult {
    let var = stats::percentile(sorted, 100.0 - VAR_CONFIDENCE_PCT);
    // Shortfall measured from var: every term is <= 0, so cvar <= var holds
    // even when the tail is one repeated value.
    let shortfall: Vec<f64> = sorted.iter().take_while(|&&p| p <= var).map(|&p| p - var).collect();
    let cvar = var + stats::mean(&shortfall);
    let interpretation = if var < 0.0 {
        format!("With {VAR_CONFIDENCE_PCT:.0}% confidence, the loss will not exceed {:.2}", -var)
    } else {
        format!("With {VAR_CONFIDENCE_PCT:.0}% confidence, the position finishes with a profit of at least {var:.2}")
    };
    VaRResult {
        confidence_level: VAR_CONFIDENCE_PCT / 100.0,
        var,
        cvar,
        interpretation,
    }
}

fn breakeven_analysis(strategy: &Strategy, terminals: &[f64], outcomes: Outcomes) -> BreakevenAnalysis {
    let lower = strategy.break_evens.lower;
    let upper = strategy.break_evens.upper;
    let lo = lower.unwrap_or(f64::NEG_INFINITY);
    let hi = upper.unwrap_or(f64::INFINITY);

    let (below, above) = terminals.iter().fold((0usize, 0usize), |(b, a), &s| {
        (b + usize::from(lower.is_some() && s < lo), a + usize::from(upper.is_some() && s > hi))
    });
    let n = terminals.len();

    BreakevenAnalysis {
        lower_break_even: lower,
        upper_break_even: upper,
        prob_below_lower: stats::fraction(below, n),
        prob_above_upper: stats::fraction(above, n),
        prob_between: stats::fraction(n - below - above, n),
        prob_profitable: outcomes.win_fraction(),
    }
}

// ── Strike sweep ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StrikePoint {
    /// Strike the structure is centered on (the straddle strike).
    pub center_strike: f64,
    pub strikes: Vec<f64>,
    pub net_premium: f64,
    pub probability_of_profit: f64,
    pub expected_profit: f64,
    pub risk_reward_ratio: Ratio,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StrikeSweep {
    pub seed: u64,
    pub num_simulations: usize,
    pub points: Vec<StrikePoint>,
    /// Center strike with the highest simulated expected profit.
    pub best_expected_profit: Option<f64>,
    /// Center strike with the highest risk/reward; no downside ranks first.
    pub best_risk_reward: Option<f64>,
}

fn risk_reward_rank(p: &StrikePoint) -> f64 {
    p.risk_reward_ratio.value().unwrap_or(f64::INFINITY)
}

/// Re-center the structure on `points` strikes evenly spaced over
/// [lower, upper], price each at the context spot and score it against one
/// shared sample of terminal prices.
pub fn strike_sweep(
    spec: &StrategySpec,
    ctx: &PricingContext,
    model: &dyn PricingModel,
    lower: f64,
    upper: f64,
    points: usize,
    config: &SimulationConfig,
) -> EngineResult<StrikeSweep> {
    check_count(config.num_simulations)?;
    if !(lower > 0.0 && upper > lower && upper.is_finite()) {
        return Err(EngineError::InvalidInput(format!(
            "strike range must satisfy 0 < lower < upper, got {lower}..{upper}"
        )));
    }
    if !(2..=MAX_STRIKE_POINTS).contains(&points) {
        return Err(EngineError::InvalidInput(format!(
            "strike points must be in 2..={MAX_STRIKE_POINTS}, got {points}"
        )));
    }

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let gbm = GbmTerminal::new(ctx.spot, ctx.rate, ctx.volatility, ctx.days_to_expiry)?;
    let terminals = draw_terminals(&gbm, config.num_simulations, seed);
    let relative = spec.spot_relative();
    let step = (upper - lower) / (points - 1) as f64;

    let points = (0..points)
        .into_par_iter()
        .map(|i| {
            let center = lower + i as f64 * step;
            let strikes = relative.strikes_for(center)?;
            let s = strategy::from_strikes(spec.kind(), &strikes, spec.quantity(), ctx, model)?;
            let profits: Vec<f64> = terminals.iter().map(|&t| s.profit_at(t)).collect();
            let (_, _, risk_reward_ratio) = gain_loss(&profits);
            Ok(StrikePoint {
                center_strike: center,
                strikes: strikes.to_vec(),
                net_premium: s.net_premium,
                probability_of_profit: Outcomes::count(&profits).win_fraction(),
                expected_profit: stats::mean(&profits),
                risk_reward_ratio,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let best_expected_profit = points
        .iter()
        .max_by(|a, b| a.expected_profit.total_cmp(&b.expected_profit))
        .map(|p| p.center_strike);
    let best_risk_reward = points
        .iter()
        .max_by(|a, b| risk_reward_rank(a).total_cmp(&risk_reward_rank(b)))
        .map(|p| p.center_strike);

    tracing::debug!(kind = %spec.kind(), seed, strikes = points.len(), "strike sweep done");

    Ok(StrikeSweep {
        seed,
        num_simulations: config.num_simulations,
        points,
        best_expected_profit,
        best_risk_reward,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scenario::analytic_expected_profit;
    use crate::models::black_scholes::BlackScholes;
    use crate::strategy::{self, PricingContext, StrategyKind, StrategySpec};

    fn built(kind: StrategyKind, rate: f64) -> Strategy {
        let ctx = PricingContext::new(100.0, rate, 0.30, 30.0).unwrap();
        strategy::build(&StrategySpec::default_for(kind), &ctx, &BlackScholes::new()).unwrap()
    }

    fn seeded(n: usize, seed: u64) -> SimulationConfig {
        SimulationConfig { num_simulations: n, seed: Some(seed) }
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let s = built(StrategyKind::Straddle, 0.05);
        let a = analyze(&s, &seeded(20_000, 42)).unwrap();
        let b = analyze(&s, &seeded(20_000, 42)).unwrap();
        assert_eq!(a, b);
        let c = analyze(&s, &seeded(20_000, 43)).unwrap();
        assert_ne!(a.summary.expected_profit, c.summary.expected_profit);
    }

    #[test]
    fn test_unseeded_run_reports_reproducible_seed() {
        let s = built(StrategyKind::Strangle, 0.05);
        let first = analyze(&s, &SimulationConfig { num_simulations: 5_000, seed: None }).unwrap();
        let seed = first.seed.unwrap();
        let again = analyze(&s, &seeded(5_000, seed)).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_converges_to_analytic_expectation() {
        for kind in StrategyKind::ALL {
            let s = built(kind, 0.05);
            let analytic = analytic_expected_profit(&s);
            for &n in &[1_000usize, 10_000, 200_000] {
                let r = analyze(&s, &seeded(n, 7)).unwrap();
                let stderr = r.summary.std_profit / (n as f64).sqrt();
                let err = (r.summary.expected_profit - analytic).abs();
                assert!(
                    err < 4.0 * stderr,
                    "{kind} n={n}: mc={} analytic={analytic} err={err} stderr={stderr}",
                    r.summary.expected_profit
                );
            }
        }
    }

    #[test]
    fn test_risk_ordering_and_shared_samples() {
        for kind in StrategyKind::ALL {
            let r = analyze(&built(kind, 0.05), &seeded(50_000, 11)).unwrap();
            assert!(r.var.cvar <= r.var.var, "{kind}: cvar {} > var {}", r.var.cvar, r.var.var);
            assert_eq!(r.breakeven.prob_profitable, r.summary.probability_of_profit);
            assert!(r.summary.probability_of_profit + r.summary.probability_of_loss <= 1.0 + 1e-12);
            let p = &r.summary.percentiles;
            assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
            assert_eq!(p.p5, r.var.var);
        }
    }

    #[test]
    fn test_cvar_bounded_by_var_on_repeated_tail() {
        // A flat block of identical losses straddling the 5th percentile
        let loss = -2.998_274_485_705_312_7;
        let sorted: Vec<f64> = std::iter::repeat(loss)
            .take(600)
            .chain((0..400).map(|i| i as f64 * 0.01))
            .collect();
        let v = value_at_risk(&sorted);
        assert_eq!(v.var, loss);
        assert!(v.cvar <= v.var, "cvar {} > var {}", v.cvar, v.var);
    }

    #[test]
    fn test_single_chunk_matches_sequential_run() {
        let s = built(StrategyKind::Straddle, 0.05);
        let r = analyze(&s, &seeded(CHUNK_SIZE, 21)).unwrap();
        let direct = analyze_with_rng(&s, CHUNK_SIZE, &mut StdRng::seed_from_u64(21)).unwrap();
        assert_eq!(r.seed, Some(21));
        assert_eq!(r.summary, direct.summary);
        assert_eq!(r.var, direct.var);
    }

    #[test]
    fn test_strike_sweep_shares_samples_with_analyze() {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let spec = StrategySpec::default_for(StrategyKind::Straddle);
        let config = seeded(20_000, 8);
        let sweep = strike_sweep(&spec, &ctx, &BlackScholes::new(), 90.0, 110.0, 5, &config).unwrap();

        assert_eq!(sweep.points.len(), 5);
        assert_eq!(sweep.seed, 8);
        let centers: Vec<f64> = sweep.points.iter().map(|p| p.center_strike).collect();
        assert_eq!(centers, vec![90.0, 95.0, 100.0, 105.0, 110.0]);
        for p in &sweep.points {
            assert_eq!(p.strikes, vec![p.center_strike]);
            assert!((0.0..=1.0).contains(&p.probability_of_profit));
        }
        assert!(sweep.best_expected_profit.is_some());
        assert!(sweep.best_risk_reward.is_some());

        // The at-the-money point sees the same sample as a full analysis
        let atm = analyze(&built(StrategyKind::Straddle, 0.05), &config).unwrap();
        let p = &sweep.points[2];
        assert!((p.expected_profit - atm.summary.expected_profit).abs() < 1e-9);
        assert_eq!(p.probability_of_profit, atm.summary.probability_of_profit);
    }

    #[test]
    fn test_strike_sweep_recenters_wings() {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let spec = StrategySpec::default_for(StrategyKind::IronCondor);
        let sweep =
            strike_sweep(&spec, &ctx, &BlackScholes::new(), 80.0, 120.0, 3, &seeded(2_000, 4)).unwrap();
        let mid = &sweep.points[1];
        assert_eq!(mid.center_strike, 100.0);
        assert_eq!(mid.strikes.len(), 4);
        assert!(mid.strikes.windows(2).all(|w| w[0] < w[1]));
        // Same seed, same answer
        let again =
            strike_sweep(&spec, &ctx, &BlackScholes::new(), 80.0, 120.0, 3, &seeded(2_000, 4)).unwrap();
        assert_eq!(sweep, again);
    }

    #[test]
    fn test_strike_sweep_rejects_bad_ranges() {
        let ctx = PricingContext::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let spec = StrategySpec::default_for(StrategyKind::Straddle);
        let m = BlackScholes::new();
        assert!(strike_sweep(&spec, &ctx, &m, 110.0, 90.0, 5, &seeded(100, 1)).is_err());
        assert!(strike_sweep(&spec, &ctx, &m, 0.0, 90.0, 5, &seeded(100, 1)).is_err());
        assert!(strike_sweep(&spec, &ctx, &m, 90.0, 110.0, MAX_STRIKE_POINTS + 1, &seeded(100, 1)).is_err());
    }

    #[test]
    fn test_straddle_break_even_probabilities() {
        let s = built(StrategyKind::Straddle, 0.05);
        let r = analyze(&s, &seeded(50_000, 3)).unwrap();
        let b = &r.breakeven;
        assert!((b.prob_below_lower + b.prob_above_upper + b.prob_between - 1.0).abs() < 1e-12);
        // Long straddle profits exactly outside the break-evens
        assert!((b.prob_below_lower + b.prob_above_upper - b.prob_profitable).abs() < 1e-3);
    }

    #[test]
    fn test_injected_generator() {
        let gbm = GbmTerminal::new(100.0, 0.05, 0.30, 30.0).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let prices = simulate_terminal_prices(&gbm, 100_000, &mut rng);
        let mean = stats::mean(&prices);
        let forward = 100.0 * (0.05_f64 * 30.0 / 365.0).exp();
        assert!((mean - forward).abs() < 0.1, "mean terminal {mean} vs forward {forward}");

        let s = built(StrategyKind::IronCondor, 0.05);
        let a = analyze_with_rng(&s, 1_000, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = analyze_with_rng(&s, 1_000, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
        assert!(a.seed.is_none());
    }

    #[test]
    fn test_zero_vol_is_deterministic() {
        let ctx = PricingContext::new(100.0, 0.05, 0.0, 30.0).unwrap();
        let s = strategy::build(&StrategySpec::default_for(StrategyKind::IronCondor), &ctx, &BlackScholes::new())
            .unwrap();
        let r = analyze(&s, &seeded(1_000, 1)).unwrap();
        assert_eq!(r.summary.std_profit, 0.0);
        assert_eq!(r.summary.max_profit, r.summary.max_loss);
    }

    #[test]
    fn test_rejects_bad_counts() {
        let s = built(StrategyKind::Straddle, 0.05);
        assert!(matches!(analyze(&s, &seeded(0, 1)), Err(EngineError::InvalidInput(_))));
        assert!(analyze(&s, &seeded(MAX_SIMULATIONS + 1, 1)).is_err());
    }
}
