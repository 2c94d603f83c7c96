use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub market_data_base_url: String,
    pub history_range: String,
    pub http_timeout_secs: u64,
    pub default_risk_free_rate: f64,
    pub default_simulations: usize,
    pub max_simulations: usize,
    pub vol_lookback_days: usize,
    pub max_lookback_days: usize,
    pub static_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let http_timeout_secs = env_var_or("HTTP_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("HTTP_TIMEOUT_SECS: {e}")))?;

        let default_risk_free_rate = env_var_or("DEFAULT_RISK_FREE_RATE", "0.05")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_RISK_FREE_RATE: {e}")))?;

        let default_simulations = env_var_or("DEFAULT_SIMULATIONS", "10000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_SIMULATIONS: {e}")))?;

        let max_simulations = env_var_or("MAX_SIMULATIONS", "200000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("MAX_SIMULATIONS: {e}")))?;

        let vol_lookback_days = env_var_or("VOL_LOOKBACK_DAYS", "252")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("VOL_LOOKBACK_DAYS: {e}")))?;

        let max_lookback_days = env_var_or("MAX_LOOKBACK_DAYS", "252")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("MAX_LOOKBACK_DAYS: {e}")))?;

        let config = Self {
            server_port,
            market_data_base_url: env_var_or(
                "MARKET_DATA_BASE_URL",
                "https://query1.finance.yahoo.com",
            ),
            history_range: env_var_or("HISTORY_RANGE", "1y"),
            http_timeout_secs,
            default_risk_free_rate,
            default_simulations,
            max_simulations,
            vol_lookback_days,
            max_lookback_days,
            static_dir: PathBuf::from(env_var_or("STATIC_DIR", "web/dist")),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> EngineResult<()> {
        if !self.default_risk_free_rate.is_finite() {
            return Err(EngineError::Config("DEFAULT_RISK_FREE_RATE must be finite".into()));
        }
        if self.max_simulations == 0 || self.default_simulations > self.max_simulations {
            return Err(EngineError::Config(format!(
                "DEFAULT_SIMULATIONS ({}) must be within 1..=MAX_SIMULATIONS ({})",
                self.default_simulations, self.max_simulations
            )));
        }
        if self.vol_lookback_days < 2 || self.max_lookback_days < 2 {
            return Err(EngineError::Config("lookback windows need at least 2 days".into()));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3001,
            market_data_base_url: "https://query1.finance.yahoo.com".into(),
            history_range: "1y".into(),
            http_timeout_secs: 10,
            default_risk_free_rate: 0.05,
            default_simulations: 10_000,
            max_simulations: 200_000,
            vol_lookback_days: 252,
            max_lookback_days: 252,
            static_dir: PathBuf::from("web/dist"),
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
