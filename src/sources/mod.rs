// =============================================================================
// Data Sources — fetch-and-normalise adapters around external providers
// =============================================================================
//
// Two independent providers feed the pipeline:
//
//   1. CoinDesk index API    — latest tick + historical OHLCV candles
//   2. alternative.me F&G    — crypto market sentiment index
//
// Each adapter issues a plain GET, parses the JSON body and maps the
// provider-specific field names onto the internal records.  The refreshers
// only see the traits below, so tests can swap in in-memory sources.

pub mod coindesk;
pub mod fear_greed;

pub use coindesk::CoinDeskClient;
pub use fear_greed::FearGreedClient;

use async_trait::async_trait;

use crate::error::{FetchError, SourceError};
use crate::market_data::{Candle, CandleKey, SentimentSnapshot, TickSnapshot};
use crate::types::Instrument;

/// Price data for the selected instrument.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest tick for `instrument`.
    async fn fetch_tick(&self, instrument: &Instrument) -> Result<TickSnapshot, SourceError>;

    /// The most recent `limit` candles for `key`, oldest first.
    async fn fetch_candles(&self, key: &CandleKey, limit: u32) -> Result<Vec<Candle>, SourceError>;
}

/// Market-wide sentiment index.
#[async_trait]
pub trait SentimentDataSource: Send + Sync {
    /// The most recent `limit` readings.
    async fn fetch_sentiment(&self, limit: u32) -> Result<SentimentSnapshot, SourceError>;
}

/// Longest provider error body kept in a [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 256;

/// Send `request` and return the body of a 2xx response.
pub(crate) async fn fetch_body(
    request: reqwest::RequestBuilder,
    endpoint: &str,
) -> Result<String, FetchError> {
    let resp = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(endpoint, e))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(endpoint, e))?;

    if !status.is_success() {
        return Err(FetchError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: truncate(body, MAX_ERROR_BODY),
        });
    }

    Ok(body)
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Reject prices the pipeline cannot display.
pub(crate) fn check_price(field: &'static str, value: f64) -> Result<f64, crate::error::ParseError> {
    if !value.is_finite() {
        return Err(crate::error::ParseError::invalid(field, format!("non-finite value {value}")));
    }
    if value < 0.0 {
        return Err(crate::error::ParseError::invalid(field, format!("negative value {value}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = truncate("ééééé".to_string(), 3);
        assert_eq!(s, "é…");
        assert_eq!(truncate("short".to_string(), 10), "short");
    }

    #[test]
    fn price_checks() {
        assert_eq!(check_price("VALUE", 1.5).unwrap(), 1.5);
        assert!(check_price("VALUE", -0.1).is_err());
        assert!(check_price("VALUE", f64::NAN).is_err());
    }
}
