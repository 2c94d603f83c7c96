pub mod routes;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// All API routes plus the dashboard static fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/api/ticker/{ticker}", get(routes::get_ticker))
        .route("/api/volatility/{ticker}", get(routes::get_volatility))
        .route("/api/strategy", post(routes::post_strategy))
        .route("/api/compare", post(routes::post_compare))
        .route("/api/heatmap", post(routes::post_heatmap))
        .route("/api/sensitivity", post(routes::post_sensitivity))
        .route("/api/monte_carlo", post(routes::post_monte_carlo))
        .route("/api/monte_carlo/strikes", post(routes::post_strike_sweep))
        .route("/api/backtest", post(routes::post_backtest))
        .route("/api/backtest/compare", post(routes::post_backtest_compare))
        .route("/api/backtest/holding_periods", post(routes::post_holding_periods))
        .route("/api/counters", get(routes::get_counters))
        .fallback_service(
            tower_http::services::ServeDir::new(&static_dir)
                .fallback(tower_http::services::ServeFile::new(static_dir.join("index.html"))),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
