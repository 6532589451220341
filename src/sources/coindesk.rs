// =============================================================================
// CoinDesk Index API Client — latest tick + historical candles
// =============================================================================
//
// Both endpoints are keyed by an API key sent as the `api_key` query
// parameter.  The key is never logged or serialised.
//
//   GET /index/cc/v1/latest/tick?market=..&instruments=..
//   GET /index/cc/v1/historical/{days|hours|minutes}?market=..&instrument=..
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{check_price, fetch_body, MarketDataSource};
use crate::error::{ParseError, SourceError};
use crate::market_data::tick::change_from_high_pct;
use crate::market_data::{Candle, CandleKey, TickSnapshot};
use crate::types::Instrument;

const TICK_PATH: &str = "/index/cc/v1/latest/tick";
const HISTORICAL_PATH: &str = "/index/cc/v1/historical";

// -----------------------------------------------------------------------------
// Wire format
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickResponse {
    #[serde(rename = "Data")]
    data: HashMap<String, TickEntry>,
}

#[derive(Debug, Deserialize)]
struct TickEntry {
    #[serde(rename = "VALUE")]
    value: f64,
    #[serde(rename = "LIFETIME_HIGH")]
    lifetime_high: f64,
    #[serde(rename = "LIFETIME_HIGH_TS")]
    lifetime_high_ts: f64,
    #[serde(rename = "CURRENT_DAY_HIGH")]
    day_high: f64,
    #[serde(rename = "CURRENT_DAY_LOW")]
    day_low: f64,
    #[serde(rename = "CURRENT_DAY_CHANGE_PERCENTAGE")]
    day_change_pct: f64,
    #[serde(rename = "CURRENT_WEEK_CHANGE_PERCENTAGE")]
    week_change_pct: f64,
    #[serde(rename = "CURRENT_MONTH_CHANGE_PERCENTAGE")]
    month_change_pct: f64,
    #[serde(rename = "CURRENT_YEAR_CHANGE_PERCENTAGE")]
    year_change_pct: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(rename = "Data")]
    data: Vec<CandleEntry>,
}

#[derive(Debug, Deserialize)]
struct CandleEntry {
    #[serde(rename = "TIMESTAMP")]
    timestamp: i64,
    #[serde(rename = "OPEN")]
    open: f64,
    #[serde(rename = "HIGH")]
    high: f64,
    #[serde(rename = "LOW")]
    low: f64,
    #[serde(rename = "CLOSE")]
    close: f64,
    #[serde(rename = "VOLUME", default)]
    volume: f64,
}

// -----------------------------------------------------------------------------
// Mapping
// -----------------------------------------------------------------------------

/// Map a latest-tick response body onto a [`TickSnapshot`] for `instrument`.
pub fn parse_tick(body: &str, instrument: &Instrument) -> Result<TickSnapshot, ParseError> {
    let resp: TickResponse = serde_json::from_str(body).map_err(|source| ParseError::Json {
        endpoint: TICK_PATH.to_string(),
        source,
    })?;

    let entry = resp
        .data
        .get(instrument.as_str())
        .ok_or_else(|| ParseError::MissingInstrument(instrument.to_string()))?;

    let value = check_price("VALUE", entry.value)?;
    let lifetime_high = check_price("LIFETIME_HIGH", entry.lifetime_high)?;
    let day_high = check_price("CURRENT_DAY_HIGH", entry.day_high)?;
    let day_low = check_price("CURRENT_DAY_LOW", entry.day_low)?;

    for (field, pct) in [
        ("CURRENT_DAY_CHANGE_PERCENTAGE", entry.day_change_pct),
        ("CURRENT_WEEK_CHANGE_PERCENTAGE", entry.week_change_pct),
        ("CURRENT_MONTH_CHANGE_PERCENTAGE", entry.month_change_pct),
        ("CURRENT_YEAR_CHANGE_PERCENTAGE", entry.year_change_pct),
    ] {
        if !pct.is_finite() {
            return Err(ParseError::invalid(field, format!("non-finite value {pct}")));
        }
    }

    Ok(TickSnapshot {
        instrument: instrument.clone(),
        value,
        day_high,
        day_low,
        lifetime_high,
        lifetime_high_at: unix_seconds("LIFETIME_HIGH_TS", entry.lifetime_high_ts as i64)?,
        day_change_pct: entry.day_change_pct,
        week_change_pct: entry.week_change_pct,
        month_change_pct: entry.month_change_pct,
        year_change_pct: entry.year_change_pct,
        from_lifetime_high_pct: change_from_high_pct(value, lifetime_high),
    })
}

/// Map a historical response body onto candles, oldest first.
///
/// Timestamps must be strictly increasing; the provider fills gaps itself.
/// An absent or empty `Data` array is an error, never an empty series.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>, ParseError> {
    let resp: HistoricalResponse = serde_json::from_str(body).map_err(|source| ParseError::Json {
        endpoint: HISTORICAL_PATH.to_string(),
        source,
    })?;
    if resp.data.is_empty() {
        return Err(ParseError::invalid("Data", "no candles in response"));
    }

    let mut candles = Vec::with_capacity(resp.data.len());
    for (index, entry) in resp.data.into_iter().enumerate() {
        if let Some(prev) = candles.last().map(|c: &Candle| c.timestamp) {
            if entry.timestamp <= prev {
                return Err(ParseError::NotIncreasing { index });
            }
        }
        candles.push(Candle::new(
            entry.timestamp,
            check_price("OPEN", entry.open)?,
            check_price("HIGH", entry.high)?,
            check_price("LOW", entry.low)?,
            check_price("CLOSE", entry.close)?,
            check_price("VOLUME", entry.volume)?,
        ));
    }

    Ok(candles)
}

fn unix_seconds(field: &'static str, secs: i64) -> Result<DateTime<Utc>, ParseError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ParseError::invalid(field, format!("timestamp {secs} out of range")))
}

// -----------------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------------

/// CoinDesk index REST client.
#[derive(Clone)]
pub struct CoinDeskClient {
    api_key: String,
    market: String,
    base_url: String,
    client: reqwest::Client,
}

impl CoinDeskClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` — e.g. `https://data-api.coindesk.com`
    /// * `market`   — index market name, e.g. `cadli`
    /// * `api_key`  — sent as a query parameter, never logged
    pub fn new(
        base_url: impl Into<String>,
        market: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for CoinDeskClient")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "CoinDeskClient initialised");

        Ok(Self {
            api_key: api_key.into(),
            market: market.into(),
            base_url,
            client,
        })
    }
}

#[async_trait]
impl MarketDataSource for CoinDeskClient {
    /// GET latest tick for a single instrument.
    #[instrument(skip(self), name = "coindesk::fetch_tick")]
    async fn fetch_tick(&self, instrument: &Instrument) -> Result<TickSnapshot, SourceError> {
        let url = format!("{}{}", self.base_url, TICK_PATH);
        let request = self.client.get(&url).query(&[
            ("market", self.market.as_str()),
            ("instruments", instrument.as_str()),
            ("apply_mapping", "true"),
            ("response_format", "JSON"),
            ("api_key", self.api_key.as_str()),
        ]);

        let body = fetch_body(request, TICK_PATH).await?;
        let tick = parse_tick(&body, instrument)?;

        debug!(instrument = %instrument, value = tick.value, "tick fetched");
        Ok(tick)
    }

    /// GET historical candles; the path carries the interval unit.
    #[instrument(skip(self), name = "coindesk::fetch_candles")]
    async fn fetch_candles(&self, key: &CandleKey, limit: u32) -> Result<Vec<Candle>, SourceError> {
        let path = format!("{}/{}", HISTORICAL_PATH, key.interval.path_segment());
        let url = format!("{}{}", self.base_url, path);
        let limit = limit.to_string();
        let request = self.client.get(&url).query(&[
            ("market", self.market.as_str()),
            ("instrument", key.instrument.as_str()),
            ("limit", limit.as_str()),
            ("aggregate", "1"),
            ("fill", "true"),
            ("apply_mapping", "true"),
            ("response_format", "JSON"),
            ("api_key", self.api_key.as_str()),
        ]);

        let body = fetch_body(request, &path).await?;
        let candles = parse_candles(&body)?;

        debug!(key = %key, count = candles.len(), "candles fetched");
        Ok(candles)
    }
}

impl std::fmt::Debug for CoinDeskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinDeskClient")
            .field("api_key", &"<redacted>")
            .field("market", &self.market)
            .field("base_url", &self.base_url)
            .finish()
    }
}
