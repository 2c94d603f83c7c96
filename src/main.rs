mod analysis;
mod backtest;
mod config;
mod errors;
mod feeds;
mod models;
mod server;
mod state;
mod strategy;
mod types;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("straddle_desk starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let port = cfg.server_port;
    tracing::info!(
        market_data = %cfg.market_data_base_url,
        max_simulations = cfg.max_simulations,
        max_lookback_days = cfg.max_lookback_days,
        static_dir = %cfg.static_dir.display(),
        "config loaded"
    );

    let app_state = match AppState::new(cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("state init error: {e}");
            std::process::exit(1);
        }
    };

    let app = server::router(app_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
