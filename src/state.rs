use crate::config::AppConfig;
use crate::errors::EngineResult;
use crate::feeds::market_data::MarketDataClient;
use crate::models::black_scholes::BlackScholes;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ── Performance counters (lock-free) ──

pub struct PerfCounters {
    pub requests_served: AtomicU64,
    pub snapshots_fetched: AtomicU64,
    pub strategies_priced: AtomicU64,
    pub simulation_draws: AtomicU64,
    pub backtests_run: AtomicU64,
    pub errors_returned: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            requests_served: AtomicU64::new(0),
            snapshots_fetched: AtomicU64::new(0),
            strategies_priced: AtomicU64::new(0),
            simulation_draws: AtomicU64::new(0),
            backtests_run: AtomicU64::new(0),
            errors_returned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests_served: self.requests_served.load(Ordering::Relaxed),
            snapshots_fetched: self.snapshots_fetched.load(Ordering::Relaxed),
            strategies_priced: self.strategies_priced.load(Ordering::Relaxed),
            simulation_draws: self.simulation_draws.load(Ordering::Relaxed),
            backtests_run: self.backtests_run.load(Ordering::Relaxed),
            errors_returned: self.errors_returned.load(Ordering::Relaxed),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CounterSnapshot {
    pub requests_served: u64,
    pub snapshots_fetched: u64,
    pub strategies_priced: u64,
    pub simulation_draws: u64,
    pub backtests_run: u64,
    pub errors_returned: u64,
}

// ── Application shared state ──

/// Immutable after startup apart from the counters. Engines never see this;
/// handlers pull what they need out of it and pass explicit parameters down.
pub struct AppState {
    pub config: AppConfig,
    pub market_data: MarketDataClient,
    pub model: BlackScholes,
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig) -> EngineResult<Arc<Self>> {
        let market_data = MarketDataClient::new(&config)?;
        Ok(Arc::new(Self {
            config,
            market_data,
            model: BlackScholes::new(),
            counters: PerfCounters::new(),
        }))
    }
}

// ── Response envelope ──

/// Every analysis response: a fresh id and timestamp around the payload.
#[derive(Debug, serde::Serialize)]
pub struct Analysis<T> {
    pub success: bool,
    pub analysis_id: String,
    pub generated_at: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: serde::Serialize> Analysis<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            analysis_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}
