// =============================================================================
// Shared types used across the Coin Pulse dashboard pipeline
// =============================================================================

use serde::{Deserialize, Serialize};

/// A tradable asset pair identifier such as `BTC-USD`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Instrument(String);

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base asset of the pair (`BTC` for `BTC-USD`).
    pub fn base_symbol(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Instrument {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Instrument> for String {
    fn from(inst: Instrument) -> Self {
        inst.0
    }
}

/// Candle period of the historical series.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Day,
    Hour,
    Minute,
}

impl Default for Interval {
    fn default() -> Self {
        Self::Day
    }
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Day, Interval::Hour, Interval::Minute];

    /// Path segment of the historical endpoint for this interval.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Day => "days",
            Self::Hour => "hours",
            Self::Minute => "minutes",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "Days"),
            Self::Hour => write!(f, "Hours"),
            Self::Minute => write!(f, "Minutes"),
        }
    }
}

/// How the price series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    Candlestick,
    Line,
    Ohlc,
}

impl Default for ChartType {
    fn default() -> Self {
        Self::Candlestick
    }
}

impl ChartType {
    pub const ALL: [ChartType; 3] = [ChartType::Candlestick, ChartType::Line, ChartType::Ohlc];

    /// Overlay indicators are only offered on bar-style charts.
    pub fn supports_indicators(self) -> bool {
        !matches!(self, Self::Line)
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candlestick => write!(f, "Candlestick"),
            Self::Line => write!(f, "Line"),
            Self::Ohlc => write!(f, "OHLC"),
        }
    }
}

/// A chart add-on the user can toggle.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Indicator {
    Volume,
    Ma,
    Ema,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Volume, Indicator::Ma, Indicator::Ema];
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volume => write!(f, "VOL"),
            Self::Ma => write!(f, "MA"),
            Self::Ema => write!(f, "EMA"),
        }
    }
}

/// Whether the deployment lets the user enable one indicator or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorMode {
    Single,
    Multi,
}

impl Default for IndicatorMode {
    fn default() -> Self {
        Self::Multi
    }
}

impl std::fmt::Display for IndicatorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::Multi => write!(f, "Multi"),
        }
    }
}
