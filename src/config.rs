// =============================================================================
// Dashboard Configuration — JSON settings with atomic save
// =============================================================================
//
// Every tunable of the refresh pipeline lives here: the instruments and
// ranges offered to the user, the default selection, indicator windows,
// refresh cadences and provider endpoints.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file.  Persistence uses tmp + rename.  The provider
// API key is deliberately NOT part of this file; it comes from the process
// environment only.
// =============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::selection::Selection;
use crate::types::{ChartType, Indicator, IndicatorMode, Instrument, Interval};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_instruments() -> Vec<Instrument> {
    [
        "BTC-USD", "ETH-USD", "XRP-USD", "BNB-USD", "SOL-USD", "TRX-USD", "DOGE-USD",
        "ADA-USD", "BCH-USD", "SUI-USD", "LINK-USD", "LTC-USD", "MATIC-USD", "DOT-USD",
        "AVAX-USD", "XLM-USD", "ETC-USD", "FIL-USD", "VET-USD", "ICP-USD", "ALGO-USD",
        "AAVE-USD", "UNI-USD", "XMR-USD", "POL-USD",
    ]
    .into_iter()
    .map(Instrument::from)
    .collect()
}

fn default_range_options() -> Vec<usize> {
    vec![15, 30, 60, 90, 180]
}

fn default_instrument() -> Instrument {
    Instrument::from("BTC-USD")
}

fn default_range() -> usize {
    30
}

fn default_indicators() -> BTreeSet<Indicator> {
    BTreeSet::from([Indicator::Volume])
}

fn default_ma_windows() -> Vec<usize> {
    vec![7, 50, 100]
}

fn default_candle_lookback() -> u32 {
    300
}

fn default_sentiment_lookback() -> u32 {
    30
}

fn default_market() -> String {
    "cadli".to_string()
}

fn default_coindesk_base_url() -> String {
    "https://data-api.coindesk.com".to_string()
}

fn default_sentiment_base_url() -> String {
    "https://api.alternative.me".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_ticker_secs() -> u64 {
    10
}

fn default_chart_secs() -> u64 {
    60
}

fn default_sentiment_secs() -> u64 {
    5
}

// =============================================================================
// RefreshPeriods
// =============================================================================

/// Independent cadence of each refresher, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPeriods {
    #[serde(default = "default_ticker_secs")]
    pub ticker_secs: u64,

    #[serde(default = "default_chart_secs")]
    pub chart_secs: u64,

    #[serde(default = "default_sentiment_secs")]
    pub sentiment_secs: u64,
}

impl Default for RefreshPeriods {
    fn default() -> Self {
        Self {
            ticker_secs: default_ticker_secs(),
            chart_secs: default_chart_secs(),
            sentiment_secs: default_sentiment_secs(),
        }
    }
}

impl RefreshPeriods {
    // A zero period would make `tokio::time::interval` panic.
    pub fn ticker(&self) -> Duration {
        Duration::from_secs(self.ticker_secs.max(1))
    }

    pub fn chart(&self) -> Duration {
        Duration::from_secs(self.chart_secs.max(1))
    }

    pub fn sentiment(&self) -> Duration {
        Duration::from_secs(self.sentiment_secs.max(1))
    }
}

// =============================================================================
// DashboardConfig
// =============================================================================

/// Top-level configuration for the dashboard pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    // --- Offered choices -----------------------------------------------------

    /// Instruments the user can pick from.
    #[serde(default = "default_instruments")]
    pub instruments: Vec<Instrument>,

    /// Display ranges (number of periods) the user can pick from.
    #[serde(default = "default_range_options")]
    pub range_options: Vec<usize>,

    /// Whether one or several indicators may be enabled at once.
    #[serde(default)]
    pub indicator_mode: IndicatorMode,

    // --- Initial selection ---------------------------------------------------

    #[serde(default = "default_instrument")]
    pub default_instrument: Instrument,

    #[serde(default)]
    pub default_interval: Interval,

    #[serde(default = "default_range")]
    pub default_range: usize,

    #[serde(default)]
    pub default_chart_type: ChartType,

    #[serde(default = "default_indicators")]
    pub default_indicators: BTreeSet<Indicator>,

    // --- Indicators & fetch windows -----------------------------------------

    /// Window sizes used for both the SMA and EMA overlays.
    #[serde(default = "default_ma_windows")]
    pub ma_windows: Vec<usize>,

    /// Historical candles requested per chart refresh, regardless of the
    /// displayed range, so the overlays have warm-up data.
    #[serde(default = "default_candle_lookback")]
    pub candle_lookback: u32,

    /// Sentiment readings requested per refresh.
    #[serde(default = "default_sentiment_lookback")]
    pub sentiment_lookback: u32,

    // --- Scheduling ----------------------------------------------------------

    #[serde(default)]
    pub refresh: RefreshPeriods,

    // --- Providers -----------------------------------------------------------

    /// Index market name sent to the price provider.
    #[serde(default = "default_market")]
    pub market: String,

    #[serde(default = "default_coindesk_base_url")]
    pub coindesk_base_url: String,

    #[serde(default = "default_sentiment_base_url")]
    pub sentiment_base_url: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // --- Presentation boundary ----------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            range_options: default_range_options(),
            indicator_mode: IndicatorMode::Multi,
            default_instrument: default_instrument(),
            default_interval: Interval::Day,
            default_range: default_range(),
            default_chart_type: ChartType::Candlestick,
            default_indicators: default_indicators(),
            ma_windows: default_ma_windows(),
            candle_lookback: default_candle_lookback(),
            sentiment_lookback: default_sentiment_lookback(),
            refresh: RefreshPeriods::default(),
            market: default_market(),
            coindesk_base_url: default_coindesk_base_url(),
            sentiment_base_url: default_sentiment_base_url(),
            http_timeout_secs: default_http_timeout_secs(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dashboard config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dashboard config from {}", path.display()))?;
        config.normalise();

        info!(
            path = %path.display(),
            instruments = config.instruments.len(),
            indicator_mode = %config.indicator_mode,
            "dashboard config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise dashboard config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "dashboard config saved (atomic)");
        Ok(())
    }

    /// Repair inconsistent combinations so the initial selection is always
    /// one the user could have picked.
    pub fn normalise(&mut self) {
        if self.instruments.is_empty() {
            warn!("no instruments configured, restoring defaults");
            self.instruments = default_instruments();
        }
        if !self.instruments.contains(&self.default_instrument) {
            warn!(
                instrument = %self.default_instrument,
                "default instrument not offered, using first configured instrument"
            );
            self.default_instrument = self.instruments[0].clone();
        }

        self.range_options.retain(|&r| r > 0);
        if self.range_options.is_empty() {
            self.range_options = default_range_options();
        }
        if !self.range_options.contains(&self.default_range) {
            self.default_range = self.range_options[0];
        }

        if self.indicator_mode == IndicatorMode::Single && self.default_indicators.len() > 1 {
            let first = self.default_indicators.iter().next().copied();
            self.default_indicators = first.into_iter().collect();
        }
    }

    /// The selection active at startup.
    pub fn initial_selection(&self) -> Selection {
        Selection {
            instrument: self.default_instrument.clone(),
            interval: self.default_interval,
            range: self.default_range,
            chart_type: self.default_chart_type,
            indicators: self.default_indicators.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}
