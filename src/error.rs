// =============================================================================
// Provider error taxonomy
// =============================================================================
//
// Fetch and parse failures are caught at the refresher boundary, logged and
// recorded; they never reach the presentation layer.  The last successfully
// published snapshot stays visible.
// =============================================================================

use thiserror::Error;

/// Transport-level failure talking to a provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl FetchError {
    /// Classify a reqwest error raised while calling `endpoint`.
    ///
    /// The request URL is stripped: it carries the provider API key as a query
    /// parameter, and these messages are logged and served to clients.
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            Self::Transport {
                endpoint: endpoint.to_string(),
                source: err.without_url(),
            }
        }
    }
}

/// The provider answered, but the payload is malformed or does not match the
/// expected schema.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON from {endpoint}: {source}")]
    Json {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response has no entry for instrument {0}")]
    MissingInstrument(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("candle timestamps are not strictly increasing at index {index}")]
    NotIncreasing { index: usize },

    #[error("unknown sentiment classification {0:?}")]
    UnknownClassification(String),

    #[error("need at least {needed} sentiment entries, got {got}")]
    NotEnoughEntries { needed: usize, got: usize },
}

impl ParseError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Error returned by the provider adapters.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SourceError {
    /// Short category label used in logs and failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(FetchError::Timeout { .. }) => "timeout",
            Self::Fetch(FetchError::Transport { .. }) => "transport",
            Self::Fetch(FetchError::Status { .. }) => "http_status",
            Self::Parse(_) => "parse",
        }
    }
}
