// =============================================================================
// alternative.me Fear & Greed Index Client
// =============================================================================
//
//   GET /fng/?limit=N&format=json
//
// Public endpoint, no key.  Values and timestamps arrive as strings.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{fetch_body, SentimentDataSource};
use crate::error::{ParseError, SourceError};
use crate::market_data::{SentimentClass, SentimentEntry, SentimentSnapshot};

const FNG_PATH: &str = "/fng/";

#[derive(Debug, Deserialize)]
struct FngResponse {
    #[serde(default)]
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    value_classification: String,
    timestamp: String,
}

/// Map a `/fng/` response body onto a [`SentimentSnapshot`].
pub fn parse_sentiment(body: &str) -> Result<SentimentSnapshot, ParseError> {
    let resp: FngResponse = serde_json::from_str(body).map_err(|source| ParseError::Json {
        endpoint: FNG_PATH.to_string(),
        source,
    })?;

    let mut entries = Vec::with_capacity(resp.data.len());
    for raw in resp.data {
        let value: u8 = raw
            .value
            .trim()
            .parse()
            .map_err(|_| ParseError::invalid("value", format!("not an integer: {:?}", raw.value)))?;
        if value > 100 {
            return Err(ParseError::invalid("value", format!("{value} is outside 0..=100")));
        }

        let secs: i64 = raw.timestamp.trim().parse().map_err(|_| {
            ParseError::invalid("timestamp", format!("not an integer: {:?}", raw.timestamp))
        })?;
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| ParseError::invalid("timestamp", format!("{secs} out of range")))?;

        entries.push(SentimentEntry {
            timestamp,
            value,
            classification: SentimentClass::parse(&raw.value_classification)?,
        });
    }

    SentimentSnapshot::from_entries(entries)
}

/// Fear & Greed index client.
#[derive(Debug, Clone)]
pub struct FearGreedClient {
    base_url: String,
    client: reqwest::Client,
}

impl FearGreedClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for FearGreedClient")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "FearGreedClient initialised");

        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl SentimentDataSource for FearGreedClient {
    #[instrument(skip(self), name = "fear_greed::fetch_sentiment")]
    async fn fetch_sentiment(&self, limit: u32) -> Result<SentimentSnapshot, SourceError> {
        let url = format!("{}{}", self.base_url, FNG_PATH);
        let limit = limit.to_string();
        let request = self
            .client
            .get(&url)
            .query(&[("limit", limit.as_str()), ("format", "json")]);

        let body = fetch_body(request, FNG_PATH).await?;
        let snapshot = parse_sentiment(&body)?;

        debug!(
            entries = snapshot.entries().len(),
            latest = snapshot.latest().value,
            "sentiment fetched"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Provider order is newest first.
    const FNG_JSON: &str = r#"{
        "name": "Fear and Greed Index",
        "data": [
            { "value": "72", "value_classification": "Greed", "timestamp": "1710460800", "time_until_update": "3600" },
            { "value": "55", "value_classification": "Neutral", "timestamp": "1710374400" },
            { "value": "18", "value_classification": "Extreme Fear", "timestamp": "1710288000" }
        ],
        "metadata": { "error": null }
    }"#;

    #[test]
    fn parses_and_orders_entries() {
        let snap = parse_sentiment(FNG_JSON).expect("should parse");
        assert_eq!(snap.entries().len(), 3);
        assert_eq!(snap.entries()[0].value, 18);
        assert_eq!(snap.latest().value, 72);
        assert_eq!(snap.latest().classification, SentimentClass::Greed);
        assert_eq!(snap.previous().value, 55);
        assert_eq!(snap.change(), 17);
    }

    #[test]
    fn rejects_out_of_range_value() {
        let body = FNG_JSON.replace("\"72\"", "\"172\"");
        assert!(matches!(
            parse_sentiment(&body),
            Err(ParseError::InvalidField { field: "value", .. })
        ));
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        let body = FNG_JSON.replace("\"1710374400\"", "\"yesterday\"");
        assert!(matches!(
            parse_sentiment(&body),
            Err(ParseError::InvalidField { field: "timestamp", .. })
        ));
    }

    #[test]
    fn rejects_unknown_classification() {
        let body = FNG_JSON.replace("\"Neutral\"", "\"Meh\"");
        assert!(matches!(
            parse_sentiment(&body),
            Err(ParseError::UnknownClassification(ref s)) if s == "Meh"
        ));
    }

    #[test]
    fn single_entry_is_not_enough() {
        let body = r#"{ "data": [ { "value": "50", "value_classification": "Neutral", "timestamp": "1" } ] }"#;
        assert!(matches!(
            parse_sentiment(body),
            Err(ParseError::NotEnoughEntries { got: 1, .. })
        ));
    }

    #[test]
    fn malformed_body() {
        assert!(matches!(parse_sentiment("{"), Err(ParseError::Json { .. })));
    }
}
