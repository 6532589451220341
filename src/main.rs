// =============================================================================
// Coin Pulse — Main Entry Point
// =============================================================================
//
// Periodically pulls ticker, candle and sentiment data for the selected
// instrument, keeps a consistent view of it in memory and serves that view
// over HTTP and WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod config;
mod error;
mod format;
mod indicators;
mod market_data;
mod scheduler;
mod selection;
mod sources;
mod types;
mod view_state;

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::DashboardConfig;
use crate::scheduler::RefreshScheduler;
use crate::sources::{CoinDeskClient, FearGreedClient};
use crate::types::Instrument;
use crate::view_state::SharedViewState;

const CONFIG_PATH: &str = "dashboard_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Coin Pulse Dashboard — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 2. Config ────────────────────────────────────────────────────────
    let mut config = DashboardConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        DashboardConfig::default()
    });

    // Override instruments / bind address from env if available.
    if let Ok(list) = std::env::var("COIN_PULSE_INSTRUMENTS") {
        let instruments: Vec<Instrument> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Instrument::from)
            .collect();
        if !instruments.is_empty() {
            config.instruments = instruments;
        }
    }
    if let Ok(addr) = std::env::var("COIN_PULSE_BIND_ADDR") {
        config.bind_addr = addr;
    }
    config.normalise();

    info!(
        instruments = config.instruments.len(),
        default_instrument = %config.default_instrument,
        ticker_secs = config.refresh.ticker_secs,
        chart_secs = config.refresh.chart_secs,
        sentiment_secs = config.refresh.sentiment_secs,
        "Configuration ready"
    );

    // ── 3. Credentials ───────────────────────────────────────────────────
    let api_key = std::env::var("COINDESK_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        bail!("COINDESK_API_KEY is not set; the price provider requires an API key");
    }

    // ── 4. Providers ─────────────────────────────────────────────────────
    let market = CoinDeskClient::new(
        config.coindesk_base_url.clone(),
        config.market.clone(),
        api_key.trim(),
        config.http_timeout(),
    )?;
    let sentiment = FearGreedClient::new(config.sentiment_base_url.clone(), config.http_timeout())?;

    // ── 5. Shared state & refreshers ─────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(SharedViewState::new(config));

    let scheduler = RefreshScheduler::new(state.clone(), Arc::new(market), Arc::new(sentiment))
        .spawn();

    // ── 6. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    scheduler.shutdown();

    if let Err(e) = state.config().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save dashboard config on shutdown");
    }

    info!("Coin Pulse shut down complete.");
    Ok(())
}
