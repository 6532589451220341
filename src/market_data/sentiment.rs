// =============================================================================
// Market Sentiment Index — bounded [0, 100] mood score
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Discrete label the provider attaches to each index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentClass {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentClass {
    /// Parse the provider's label (`"Extreme Fear"`, `"Greed"`, ...).
    pub fn parse(label: &str) -> Result<Self, ParseError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "extreme fear" => Ok(Self::ExtremeFear),
            "fear" => Ok(Self::Fear),
            "neutral" => Ok(Self::Neutral),
            "greed" => Ok(Self::Greed),
            "extreme greed" => Ok(Self::ExtremeGreed),
            _ => Err(ParseError::UnknownClassification(label.to_string())),
        }
    }

    /// Badge tone used by the presentation layer.
    pub fn tone(self) -> Tone {
        match self {
            Self::ExtremeFear | Self::Fear => Tone::Red,
            Self::Neutral => Tone::Orange,
            Self::Greed | Self::ExtremeGreed => Tone::Green,
        }
    }
}

impl std::fmt::Display for SentimentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtremeFear => write!(f, "EXTREME FEAR"),
            Self::Fear => write!(f, "FEAR"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Greed => write!(f, "GREED"),
            Self::ExtremeGreed => write!(f, "EXTREME GREED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tone {
    Red,
    Orange,
    Green,
}

/// Colour band for a single index value.
pub fn band_color(value: u8) -> &'static str {
    match value {
        0..=20 => "#B22222",
        21..=40 => "#E57373",
        41..=60 => "#FFEB3B",
        61..=80 => "#81C784",
        _ => "#388E3C",
    }
}

/// One point of the sentiment index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentEntry {
    pub timestamp: DateTime<Utc>,
    pub value: u8,
    pub classification: SentimentClass,
}

/// Trailing window of index values, oldest first.  Always holds at least two
/// entries; only [`SentimentSnapshot::from_entries`] builds one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSnapshot {
    entries: Vec<SentimentEntry>,
}

impl SentimentSnapshot {
    /// Sort `entries` by timestamp.  At least two entries are required so that
    /// both `latest` and `previous` exist.
    pub fn from_entries(mut entries: Vec<SentimentEntry>) -> Result<Self, ParseError> {
        if entries.len() < 2 {
            return Err(ParseError::NotEnoughEntries {
                needed: 2,
                got: entries.len(),
            });
        }
        entries.sort_by_key(|e| e.timestamp);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SentimentEntry] {
        &self.entries
    }

    pub fn latest(&self) -> &SentimentEntry {
        &self.entries[self.entries.len() - 1]
    }

    pub fn previous(&self) -> &SentimentEntry {
        &self.entries[self.entries.len() - 2]
    }

    /// Point change between the two most recent readings.
    pub fn change(&self) -> i16 {
        i16::from(self.latest().value) - i16::from(self.previous().value)
    }
}
