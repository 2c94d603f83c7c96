use crate::analysis::monte_carlo::{self, MonteCarloReport, SimulationConfig, StrikeSweep, DEFAULT_STRIKE_POINTS};
use crate::analysis::scenario::{self, ProfilePoint, ScenarioPoint};
use crate::analysis::sensitivity::{self, SensitivityReport, SweepRange};
use crate::analysis::stats;
use crate::backtest::{self, BacktestParams, BacktestReport, HoldingPeriodResult, StrategyComparison};
use crate::errors::{EngineError, EngineResult};
use crate::models::volatility::{self, VolPoint, TERM_STRUCTURE_WINDOWS};
use crate::state::{Analysis, AppState, CounterSnapshot, PerfCounters};
use crate::strategy::{self, PricingContext, PricingResult, StrategyKind, StrategySpec, StrategySummary};
use crate::types::MarketSnapshot;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub type ApiResult<T> = Result<Json<Analysis<T>>, EngineError>;

/// Expiries (days) of the heat map when the request gives none.
pub const HEATMAP_EXPIRIES: [f64; 7] = [7.0, 14.0, 21.0, 30.0, 45.0, 60.0, 90.0];

/// Payoff profile span for strategy comparison, as multiples of spot.
const PROFILE_RANGE: (f64, f64) = (0.7, 1.3);
const PROFILE_POINTS: usize = 100;

/// Default strike sweep span, as multiples of spot.
const STRIKE_SWEEP_RANGE: (f64, f64) = (0.8, 1.2);

/// Draws per strike sweep when the request gives none.
const STRIKE_SWEEP_SIMULATIONS: usize = 5000;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::DataUnavailable(_) => StatusCode::NOT_FOUND,
            EngineError::Network(_) | EngineError::Parse(_) => StatusCode::BAD_GATEWAY,
            EngineError::Config(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Count, log and wrap one handler outcome.
fn finish<T: serde::Serialize>(state: &AppState, route: &'static str, result: EngineResult<T>) -> ApiResult<T> {
    PerfCounters::bump(&state.counters.requests_served, 1);
    match result {
        Ok(data) => {
            tracing::info!(route, "request served");
            Ok(Json(Analysis::new(data)))
        }
        Err(e) => {
            PerfCounters::bump(&state.counters.errors_returned, 1);
            match &e {
                EngineError::InvalidInput(_) | EngineError::DataUnavailable(_) => {
                    tracing::warn!(route, error = %e, "request rejected")
                }
                _ => tracing::error!(route, error = %e, "request failed"),
            }
            Err(e)
        }
    }
}

/// Request bodies are client input: any decode failure is a 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(body).map_err(|e| EngineError::InvalidInput(format!("bad request body: {e}")))
}

// ── Request shapes ──

fn default_days() -> f64 {
    30.0
}
fn default_strategy() -> StrategySpec {
    StrategySpec::default_for(StrategyKind::Straddle)
}
fn default_holding_days() -> usize {
    30
}
fn default_lookback() -> usize {
    30
}
fn default_entry_step() -> usize {
    1
}
fn default_strike_points() -> usize {
    DEFAULT_STRIKE_POINTS
}
fn default_scan_min() -> usize {
    7
}
fn default_scan_max() -> usize {
    90
}
fn default_scan_step() -> usize {
    7
}

/// Where the pricing inputs come from. `spot` + `volatility` together skip
/// the market data fetch entirely.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MarketInputs {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default = "default_days")]
    pub days: f64,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub spot: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct StrategyRequest {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
}

/// Sweep bounds as multiples of the base value; `steps` falls back to the
/// default range's count.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RangeInput {
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub steps: Option<usize>,
}

impl RangeInput {
    fn resolve(range: Option<Self>, default: SweepRange) -> EngineResult<SweepRange> {
        match range {
            Some(r) => SweepRange::new(r.lower, r.upper, r.steps.unwrap_or(default.steps)),
            None => Ok(default),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct SensitivityRequest {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default)]
    pub volatility_range: Option<RangeInput>,
    #[serde(default)]
    pub spot_range: Option<RangeInput>,
    #[serde(default)]
    pub time_points: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
pub struct HeatmapRequest {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default)]
    pub expiries: Option<Vec<f64>>,
    #[serde(default)]
    pub price_changes: Option<Vec<f64>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct MonteCarloRequest {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default)]
    pub num_simulations: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct StrikeSweepRequest {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default = "default_strike_points")]
    pub points: usize,
    #[serde(default)]
    pub num_simulations: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct BacktestRequest {
    pub ticker: String,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default = "default_holding_days")]
    pub holding_days: usize,
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,
    #[serde(default = "default_entry_step")]
    pub entry_step: usize,
    #[serde(default)]
    pub strike_increment: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct BacktestCompareRequest {
    pub ticker: String,
    #[serde(default = "default_holding_days")]
    pub holding_days: usize,
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,
    #[serde(default = "default_entry_step")]
    pub entry_step: usize,
    #[serde(default)]
    pub strike_increment: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct HoldingScanRequest {
    pub ticker: String,
    #[serde(default = "default_strategy")]
    pub strategy: StrategySpec,
    #[serde(default = "default_scan_min")]
    pub min_days: usize,
    #[serde(default = "default_scan_max")]
    pub max_days: usize,
    #[serde(default = "default_scan_step")]
    pub step: usize,
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,
    #[serde(default)]
    pub strike_increment: Option<f64>,
}

// ── Response shapes ──

/// The inputs an analysis was actually priced with.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarketView {
    pub ticker: Option<String>,
    pub spot: f64,
    pub volatility: f64,
    pub risk_free_rate: f64,
    pub days_to_expiry: f64,
}

impl MarketView {
    fn context(&self) -> EngineResult<PricingContext> {
        PricingContext::new(self.spot, self.risk_free_rate, self.volatility, self.days_to_expiry)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TickerResponse {
    pub snapshot: MarketSnapshot,
    pub historical_volatility: Option<f64>,
}

#[derive(Debug, serde::Serialize)]
pub struct VolatilityResponse {
    pub ticker: String,
    pub current: Option<f64>,
    pub term_structure: Vec<VolPoint>,
}

#[derive(Debug, serde::Serialize)]
pub struct StrategyResponse {
    pub market: MarketView,
    pub summary: StrategySummary,
    pub pricing: PricingResult,
    pub scenarios: Vec<ScenarioPoint>,
}

#[derive(Debug, serde::Serialize)]
pub struct ComparedStrategy {
    pub summary: StrategySummary,
    pub profile: Vec<ProfilePoint>,
}

#[derive(Debug, serde::Serialize)]
pub struct CompareResponse {
    pub market: MarketView,
    pub strategies: Vec<ComparedStrategy>,
}

#[derive(Debug, serde::Serialize)]
pub struct HeatmapResponse {
    pub market: MarketView,
    pub strategy: StrategyKind,
    pub expiries: Vec<f64>,
    pub price_changes: Vec<f64>,
    pub points: Vec<ScenarioPoint>,
}

#[derive(Debug, serde::Serialize)]
pub struct SensitivityResponse {
    pub market: MarketView,
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub report: SensitivityReport,
}

#[derive(Debug, serde::Serialize)]
pub struct MonteCarloResponse {
    pub market: MarketView,
    pub strategy: StrategySummary,
    /// Closed-form expectation under the same GBM law, for comparison
    /// with the simulated mean.
    pub analytic_expected_profit: f64,
    #[serde(flatten)]
    pub report: MonteCarloReport,
}

#[derive(Debug, serde::Serialize)]
pub struct StrikeSweepResponse {
    pub market: MarketView,
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub sweep: StrikeSweep,
}

#[derive(Debug, serde::Serialize)]
pub struct BacktestResponse {
    pub ticker: String,
    #[serde(flatten)]
    pub report: BacktestReport,
}

#[derive(Debug, serde::Serialize)]
pub struct BacktestCompareResponse {
    pub ticker: String,
    pub holding_days: usize,
    pub results: Vec<StrategyComparison>,
}

#[derive(Debug, serde::Serialize)]
pub struct HoldingScanResponse {
    pub ticker: String,
    pub strategy: StrategyKind,
    pub results: Vec<HoldingPeriodResult>,
}

// ── Market resolution ──

async fn load_snapshot(state: &AppState, ticker: &str) -> EngineResult<MarketSnapshot> {
    let snapshot = state.market_data.snapshot(ticker).await?;
    PerfCounters::bump(&state.counters.snapshots_fetched, 1);
    Ok(snapshot)
}

async fn resolve_market(state: &AppState, inputs: &MarketInputs) -> EngineResult<MarketView> {
    if let Some(v) = inputs.volatility {
        if !(v.is_finite() && v > 0.0) {
            return Err(EngineError::InvalidInput(format!("volatility must be > 0, got {v}")));
        }
    }

    let view = match (inputs.spot, inputs.volatility) {
        (Some(spot), Some(volatility)) => MarketView {
            ticker: inputs.ticker.clone(),
            spot,
            volatility,
            risk_free_rate: inputs.rate.unwrap_or(state.config.default_risk_free_rate),
            days_to_expiry: inputs.days,
        },
        _ => {
            let ticker = inputs.ticker.as_deref().ok_or_else(|| {
                EngineError::invalid("ticker is required unless spot and volatility are both given")
            })?;
            let snapshot = load_snapshot(state, ticker).await?;
            let volatility = match inputs.volatility {
                Some(v) => v,
                None => snapshot.historical_volatility(state.config.vol_lookback_days)?,
            };
            MarketView {
                ticker: Some(snapshot.ticker),
                spot: inputs.spot.unwrap_or(snapshot.spot),
                volatility,
                risk_free_rate: inputs.rate.unwrap_or(snapshot.risk_free_rate),
                days_to_expiry: inputs.days,
            }
        }
    };

    view.context()?;
    Ok(view)
}

fn price(state: &AppState, spec: &StrategySpec, ctx: &PricingContext) -> EngineResult<strategy::Strategy> {
    let built = strategy::build(spec, ctx, &state.model)?;
    PerfCounters::bump(&state.counters.strategies_priced, 1);
    Ok(built)
}

// ── Handlers ──

/// GET /api/ticker/{ticker} -- snapshot without history
pub async fn get_ticker(State(state): State<Arc<AppState>>, Path(ticker): Path<String>) -> ApiResult<TickerResponse> {
    let result = ticker_analysis(&state, &ticker).await;
    finish(&state, "ticker", result)
}

async fn ticker_analysis(state: &AppState, ticker: &str) -> EngineResult<TickerResponse> {
    let snapshot = load_snapshot(state, ticker).await?;
    let historical_volatility = snapshot.historical_volatility(state.config.vol_lookback_days).ok();
    Ok(TickerResponse { snapshot, historical_volatility })
}

/// GET /api/volatility/{ticker} -- realized volatility term structure
pub async fn get_volatility(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<VolatilityResponse> {
    let result = volatility_analysis(&state, &ticker).await;
    finish(&state, "volatility", result)
}

async fn volatility_analysis(state: &AppState, ticker: &str) -> EngineResult<VolatilityResponse> {
    let snapshot = load_snapshot(state, ticker).await?;
    let closes = snapshot.closes();
    Ok(VolatilityResponse {
        current: snapshot.historical_volatility(state.config.vol_lookback_days).ok(),
        term_structure: volatility::term_structure(&closes, &TERM_STRUCTURE_WINDOWS),
        ticker: snapshot.ticker,
    })
}

/// POST /api/strategy -- price, summarize and run the -50%..+50% scenario grid
pub async fn post_strategy(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<StrategyResponse> {
    let result = strategy_analysis(&state, &body).await;
    finish(&state, "strategy", result)
}

async fn strategy_analysis(state: &AppState, body: &[u8]) -> EngineResult<StrategyResponse> {
    let req: StrategyRequest = parse_body(body)?;
    let market = resolve_market(state, &req.market).await?;
    let built = price(state, &req.strategy, &market.context()?)?;
    let axis = scenario::price_change_axis(-50.0, 50.0, 5.0)?;
    Ok(StrategyResponse {
        scenarios: scenario::grid(&built, &axis)?,
        summary: built.summary(),
        pricing: built.pricing_result(),
        market,
    })
}

/// POST /api/compare -- all three strategies side by side
pub async fn post_compare(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<CompareResponse> {
    let result = compare_analysis(&state, &body).await;
    finish(&state, "compare", result)
}

async fn compare_analysis(state: &AppState, body: &[u8]) -> EngineResult<CompareResponse> {
    let inputs: MarketInputs = parse_body(body)?;
    let market = resolve_market(state, &inputs).await?;
    let ctx = market.context()?;
    let (lo, hi) = PROFILE_RANGE;

    let strategies = StrategyKind::ALL
        .iter()
        .map(|&kind| {
            let built = price(state, &StrategySpec::default_for(kind), &ctx)?;
            Ok(ComparedStrategy {
                profile: scenario::payoff_profile(&built, ctx.spot * lo, ctx.spot * hi, PROFILE_POINTS)?,
                summary: built.summary(),
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(CompareResponse { market, strategies })
}

/// POST /api/heatmap -- price change x expiry grid
pub async fn post_heatmap(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<HeatmapResponse> {
    let result = heatmap_analysis(&state, &body).await;
    finish(&state, "heatmap", result)
}

async fn heatmap_analysis(state: &AppState, body: &[u8]) -> EngineResult<HeatmapResponse> {
    let req: HeatmapRequest = parse_body(body)?;
    let market = resolve_market(state, &req.market).await?;
    let expiries = stats::sorted(&req.expiries.unwrap_or_else(|| HEATMAP_EXPIRIES.to_vec()));
    let price_changes = stats::sorted(&req.price_changes.unwrap_or_else(scenario::default_price_changes));

    let points = scenario::expiry_grid(&req.strategy, &market.context()?, &state.model, &price_changes, &expiries)?;
    PerfCounters::bump(&state.counters.strategies_priced, expiries.len() as u64);

    Ok(HeatmapResponse {
        market,
        strategy: req.strategy.kind(),
        expiries,
        price_changes,
        points,
    })
}

/// POST /api/sensitivity -- volatility, spot and time sweeps
pub async fn post_sensitivity(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<SensitivityResponse> {
    let result = sensitivity_analysis(&state, &body).await;
    finish(&state, "sensitivity", result)
}

async fn sensitivity_analysis(state: &AppState, body: &[u8]) -> EngineResult<SensitivityResponse> {
    let req: SensitivityRequest = parse_body(body)?;
    let volatility = RangeInput::resolve(req.volatility_range, SweepRange::VOLATILITY)?;
    let spot = RangeInput::resolve(req.spot_range, SweepRange::SPOT)?;
    let market = resolve_market(state, &req.market).await?;
    let time_points = req.time_points.unwrap_or_else(|| sensitivity::default_time_points(market.days_to_expiry));
    let report = sensitivity::analyze_with(
        &req.strategy,
        &market.context()?,
        &state.model,
        &volatility,
        &spot,
        time_points,
    )?;
    Ok(SensitivityResponse {
        market,
        strategy: req.strategy.kind(),
        report,
    })
}

/// POST /api/monte_carlo -- GBM simulation, VaR and break-even probabilities
pub async fn post_monte_carlo(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<MonteCarloResponse> {
    let result = monte_carlo_analysis(&state, &body).await;
    finish(&state, "monte_carlo", result)
}

async fn monte_carlo_analysis(state: &Arc<AppState>, body: &[u8]) -> EngineResult<MonteCarloResponse> {
    let req: MonteCarloRequest = parse_body(body)?;
    let n = req.num_simulations.unwrap_or(state.config.default_simulations);
    check_simulations(state, n)?;

    let market = resolve_market(state, &req.market).await?;
    let built = price(state, &req.strategy, &market.context()?)?;
    let summary = built.summary();
    let analytic_expected_profit = scenario::analytic_expected_profit(&built);
    let config = SimulationConfig { num_simulations: n, seed: req.seed };

    let report = tokio::task::spawn_blocking(move || monte_carlo::analyze(&built, &config)).await??;
    PerfCounters::bump(&state.counters.simulation_draws, n as u64);

    Ok(MonteCarloResponse {
        market,
        strategy: summary,
        analytic_expected_profit,
        report,
    })
}

/// POST /api/monte_carlo/strikes -- simulated profit across center strikes
pub async fn post_strike_sweep(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<StrikeSweepResponse> {
    let result = strike_sweep_analysis(&state, &body).await;
    finish(&state, "strike_sweep", result)
}

async fn strike_sweep_analysis(state: &Arc<AppState>, body: &[u8]) -> EngineResult<StrikeSweepResponse> {
    let req: StrikeSweepRequest = parse_body(body)?;
    let n = req
        .num_simulations
        .unwrap_or(STRIKE_SWEEP_SIMULATIONS.min(state.config.max_simulations));
    check_simulations(state, n)?;

    let market = resolve_market(state, &req.market).await?;
    let ctx = market.context()?;
    let (lo, hi) = STRIKE_SWEEP_RANGE;
    let lower = req.lower.unwrap_or(ctx.spot * lo);
    let upper = req.upper.unwrap_or(ctx.spot * hi);
    let config = SimulationConfig { num_simulations: n, seed: req.seed };
    let spec = req.strategy;
    let kind = spec.kind();
    let points = req.points;

    let worker = Arc::clone(state);
    let sweep = tokio::task::spawn_blocking(move || {
        monte_carlo::strike_sweep(&spec, &ctx, &worker.model, lower, upper, points, &config)
    })
    .await??;
    PerfCounters::bump(&state.counters.simulation_draws, n as u64);
    PerfCounters::bump(&state.counters.strategies_priced, sweep.points.len() as u64);

    Ok(StrikeSweepResponse {
        market,
        strategy: kind,
        sweep,
    })
}

/// POST /api/backtest -- rolling historical backtest
pub async fn post_backtest(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<BacktestResponse> {
    let result = backtest_analysis(&state, &body).await;
    finish(&state, "backtest", result)
}

fn check_simulations(state: &AppState, n: usize) -> EngineResult<()> {
    if n == 0 || n > state.config.max_simulations {
        return Err(EngineError::InvalidInput(format!(
            "num_simulations must be in 1..={}, got {n}",
            state.config.max_simulations
        )));
    }
    Ok(())
}

fn check_lookback(state: &AppState, lookback_days: usize) -> EngineResult<()> {
    if lookback_days > state.config.max_lookback_days {
        return Err(EngineError::InvalidInput(format!(
            "lookback_days must be <= {}, got {lookback_days}",
            state.config.max_lookback_days
        )));
    }
    Ok(())
}

async fn backtest_analysis(state: &Arc<AppState>, body: &[u8]) -> EngineResult<BacktestResponse> {
    let req: BacktestRequest = parse_body(body)?;
    check_lookback(state, req.lookback_days)?;
    let snapshot = load_snapshot(state, &req.ticker).await?;

    let params = BacktestParams {
        lookback_days: req.lookback_days,
        entry_step: req.entry_step,
        strike_increment: req.strike_increment,
        ..BacktestParams::new(req.strategy, req.holding_days, req.rate.unwrap_or(snapshot.risk_free_rate))
    };
    let worker = Arc::clone(state);
    let history = snapshot.history;
    let report = tokio::task::spawn_blocking(move || backtest::run(&history, &params, &worker.model)).await??;
    PerfCounters::bump(&state.counters.backtests_run, 1);

    Ok(BacktestResponse {
        ticker: snapshot.ticker,
        report,
    })
}

/// POST /api/backtest/compare -- every strategy over the same history
pub async fn post_backtest_compare(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<BacktestCompareResponse> {
    let result = backtest_compare_analysis(&state, &body).await;
    finish(&state, "backtest_compare", result)
}

async fn backtest_compare_analysis(state: &Arc<AppState>, body: &[u8]) -> EngineResult<BacktestCompareResponse> {
    let req: BacktestCompareRequest = parse_body(body)?;
    check_lookback(state, req.lookback_days)?;
    let snapshot = load_snapshot(state, &req.ticker).await?;

    let params = BacktestParams {
        lookback_days: req.lookback_days,
        entry_step: req.entry_step,
        strike_increment: req.strike_increment,
        ..BacktestParams::new(default_strategy(), req.holding_days, req.rate.unwrap_or(snapshot.risk_free_rate))
    };
    let worker = Arc::clone(state);
    let history = snapshot.history;
    let results = tokio::task::spawn_blocking(move || backtest::compare(&history, &params, &worker.model)).await??;
    PerfCounters::bump(&state.counters.backtests_run, results.len() as u64);

    Ok(BacktestCompareResponse {
        ticker: snapshot.ticker,
        holding_days: req.holding_days,
        results,
    })
}

/// POST /api/backtest/holding_periods -- backtest across holding periods
pub async fn post_holding_periods(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<HoldingScanResponse> {
    let result = holding_scan_analysis(&state, &body).await;
    finish(&state, "holding_periods", result)
}

async fn holding_scan_analysis(state: &Arc<AppState>, body: &[u8]) -> EngineResult<HoldingScanResponse> {
    let req: HoldingScanRequest = parse_body(body)?;
    check_lookback(state, req.lookback_days)?;
    let snapshot = load_snapshot(state, &req.ticker).await?;

    let params = BacktestParams {
        lookback_days: req.lookback_days,
        strike_increment: req.strike_increment,
        ..BacktestParams::new(req.strategy, req.min_days, snapshot.risk_free_rate)
    };
    let (min, max, step) = (req.min_days, req.max_days, req.step);
    let worker = Arc::clone(state);
    let history = snapshot.history;
    let results = tokio::task::spawn_blocking(move || {
        backtest::holding_period_scan(&history, &params, min, max, step, &worker.model)
    })
    .await??;
    PerfCounters::bump(&state.counters.backtests_run, results.len() as u64);

    Ok(HoldingScanResponse {
        ticker: snapshot.ticker,
        strategy: req.strategy.kind(),
        results,
    })
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<CounterSnapshot> {
    Json(state.counters.snapshot())
}
