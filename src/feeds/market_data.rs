use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::types::{MarketSnapshot, PricePoint};
use reqwest::{Client, StatusCode};

/// 13-week T-bill yield index, quoted in percent.
pub const RATE_SYMBOL: &str = "^IRX";

/// Yahoo Finance chart API client. One request per call, no retries, no cache.
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
    history_range: String,
    fallback_rate: f64,
}

impl MarketDataClient {
    pub fn new(config: &AppConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; straddle-desk/0.1)")
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.market_data_base_url.trim_end_matches('/').to_string(),
            history_range: config.history_range.clone(),
            fallback_rate: config.default_risk_free_rate,
        })
    }

    /// Quote, daily history and risk-free rate for one ticker.
    pub async fn snapshot(&self, ticker: &str) -> EngineResult<MarketSnapshot> {
        let ticker = normalize_ticker(ticker)?;
        let chart = self.fetch_chart(&ticker, &self.history_range).await?;
        let rate = self.risk_free_rate().await;
        tracing::info!(
            ticker = %ticker,
            spot = chart.spot,
            closes = chart.history.len(),
            rate,
            "market snapshot loaded"
        );
        Ok(chart.into_snapshot(rate))
    }

    /// Last ^IRX close / 100, or the configured default if that fails.
    pub async fn risk_free_rate(&self) -> f64 {
        match self.fetch_chart(RATE_SYMBOL, "5d").await {
            Ok(chart) if chart.spot.is_finite() && chart.spot > 0.0 => chart.spot / 100.0,
            Ok(chart) => {
                tracing::warn!(value = chart.spot, fallback = self.fallback_rate, "unusable rate quote");
                self.fallback_rate
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = self.fallback_rate, "rate fetch failed");
                self.fallback_rate
            }
        }
    }

    async fn fetch_chart(&self, symbol: &str, range: &str) -> EngineResult<ChartData> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={range}&interval=1d",
            self.base_url,
            symbol.replace('^', "%5E")
        );

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::DataUnavailable(format!("unknown ticker {symbol}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!("HTTP {status} for {symbol}: {body}")));
        }

        let body = resp.text().await?;
        parse_chart(symbol, &body)
    }
}

/// Upper-case and check a ticker symbol before it goes into a URL.
pub fn normalize_ticker(raw: &str) -> EngineResult<String> {
    let t = raw.trim().to_ascii_uppercase();
    let valid = !t.is_empty()
        && t.len() <= 15
        && t.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if valid {
        Ok(t)
    } else {
        Err(EngineError::InvalidInput(format!("invalid ticker: {raw:?}")))
    }
}

// Chart response shape:
// {
//   "chart": {
//     "result": [{
//       "meta": {"currency": "USD", "symbol": "AAPL", "regularMarketPrice": 189.5, ...},
//       "timestamp": [1704205800, ...],
//       "indicators": {"quote": [{"close": [185.6, null, ...]}]}
//     }],
//     "error": null
//   }
// }

#[derive(serde::Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(serde::Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(serde::Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<Indicators>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    symbol: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
}

#[derive(serde::Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(serde::Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Parsed chart payload, before the rate is attached.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: String,
    pub spot: f64,
    pub previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<u64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub history: Vec<PricePoint>,
}

impl ChartData {
    pub fn into_snapshot(self, risk_free_rate: f64) -> MarketSnapshot {
        let (day_change, day_change_pct) = match self.previous_close {
            Some(prev) if prev > 0.0 => (self.spot - prev, (self.spot - prev) / prev * 100.0),
            _ => (0.0, 0.0),
        };
        MarketSnapshot {
            ticker: self.ticker,
            name: self.name,
            currency: self.currency,
            spot: self.spot,
            previous_close: self.previous_close,
            day_change,
            day_change_pct,
            day_high: self.day_high,
            day_low: self.day_low,
            fifty_two_week_high: self.fifty_two_week_high,
            fifty_two_week_low: self.fifty_two_week_low,
            volume: self.volume,
            market_cap: None,
            risk_free_rate,
            history: self.history,
        }
    }
}

/// Parse a chart response body. Null closes (halts, holidays) are dropped.
pub fn parse_chart(symbol: &str, body: &str) -> EngineResult<ChartData> {
    let resp: ChartResponse = serde_json::from_str(body)?;

    if let Some(err) = resp.chart.error {
        return Err(EngineError::DataUnavailable(format!(
            "{symbol}: {} ({})",
            err.description.unwrap_or_default(),
            err.code.unwrap_or_default()
        )));
    }

    let result = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| EngineError::DataUnavailable(format!("no chart data for {symbol}")))?;

    let closes = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .map(|q| q.close)
        .unwrap_or_default();

    let history: Vec<PricePoint> = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let close = close.filter(|c| c.is_finite() && *c > 0.0)?;
            let date = chrono::DateTime::from_timestamp(ts, 0)?.date_naive();
            Some(PricePoint { date, close })
        })
        .collect();

    let meta = result.meta;
    let spot = meta
        .regular_market_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .or_else(|| history.last().map(|p| p.close))
        .ok_or_else(|| EngineError::DataUnavailable(format!("no price for {symbol}")))?;

    let previous_close = meta
        .previous_close
        .or_else(|| history.len().checked_sub(2).map(|i| history[i].close));

    Ok(ChartData {
        ticker: meta.symbol.unwrap_or_else(|| symbol.to_string()),
        name: meta.long_name.or(meta.short_name),
        currency: meta.currency.unwrap_or_else(|| "USD".to_string()),
        spot,
        previous_close,
        day_high: meta.regular_market_day_high,
        day_low: meta.regular_market_day_low,
        volume: meta.regular_market_volume,
        fifty_two_week_high: meta.fifty_two_week_high,
        fifty_two_week_low: meta.fifty_two_week_low,
        history,
    })
}
