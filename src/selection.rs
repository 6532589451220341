// =============================================================================
// Selection — the user's current view configuration
// =============================================================================
//
// Only instrument and interval changes are data-affecting: they supersede the
// in-flight ticker and chart fetches and restart both refreshers.  Range,
// chart type and indicator changes only alter how the already published data
// is cut and decorated.
// =============================================================================

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DashboardConfig;
use crate::market_data::CandleKey;
use crate::types::{ChartType, Indicator, IndicatorMode, Instrument, Interval};

/// User-chosen configuration.  Not persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub instrument: Instrument,
    pub interval: Interval,
    /// Number of periods to display.
    pub range: usize,
    pub chart_type: ChartType,
    pub indicators: BTreeSet<Indicator>,
}

impl Selection {
    pub fn candle_key(&self) -> CandleKey {
        CandleKey::new(self.instrument.clone(), self.interval)
    }

    /// Indicators that actually apply.  Line charts carry no overlays, so the
    /// set is empty for them regardless of what the user toggled.
    pub fn effective_indicators(&self) -> BTreeSet<Indicator> {
        if self.chart_type.supports_indicators() {
            self.indicators.clone()
        } else {
            BTreeSet::new()
        }
    }

    pub fn shows(&self, indicator: Indicator) -> bool {
        self.chart_type.supports_indicators() && self.indicators.contains(&indicator)
    }

    /// Validate `update` against `config` and produce the resulting selection.
    pub fn apply(
        &self,
        update: &SelectionUpdate,
        config: &DashboardConfig,
    ) -> Result<AppliedSelection, SelectionError> {
        let mut next = self.clone();
        let mut changes = Vec::new();

        if let Some(raw) = &update.instrument {
            let instrument = Instrument::new(raw.as_str());
            if !config.instruments.contains(&instrument) {
                return Err(SelectionError::UnknownInstrument(instrument));
            }
            next.instrument = instrument;
        }
        if let Some(interval) = update.interval {
            next.interval = interval;
        }
        if let Some(range) = update.range {
            if !config.range_options.contains(&range) {
                return Err(SelectionError::RangeNotOffered {
                    range,
                    offered: config.range_options.clone(),
                });
            }
            next.range = range;
        }
        if let Some(chart_type) = update.chart_type {
            next.chart_type = chart_type;
        }
        if let Some(indicators) = &update.indicators {
            let set: BTreeSet<Indicator> = indicators.iter().copied().collect();
            if config.indicator_mode == IndicatorMode::Single && set.len() > 1 {
                return Err(SelectionError::TooManyIndicators(set.len()));
            }
            next.indicators = set;
        }

        let prev = self;
        macro_rules! note {
            ($field:ident) => {
                if prev.$field != next.$field {
                    changes.push(format!(
                        "{}: {:?} -> {:?}",
                        stringify!($field),
                        prev.$field,
                        next.$field
                    ));
                }
            };
        }
        note!(instrument);
        note!(interval);
        note!(range);
        note!(chart_type);
        note!(indicators);

        let kind = if prev.instrument != next.instrument || prev.interval != next.interval {
            ChangeKind::Data
        } else if changes.is_empty() {
            ChangeKind::None
        } else {
            ChangeKind::Display
        };

        Ok(AppliedSelection {
            selection: next,
            kind,
            changes,
        })
    }
}

/// Partial selection change coming from user input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionUpdate {
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub interval: Option<Interval>,
    #[serde(default)]
    pub range: Option<usize>,
    #[serde(default)]
    pub chart_type: Option<ChartType>,
    #[serde(default)]
    pub indicators: Option<Vec<Indicator>>,
}

/// How far a selection change reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// Nothing changed.
    None,
    /// Only presentation parameters changed.
    Display,
    /// Instrument or interval changed; data refreshers must restart.
    Data,
}

#[derive(Debug, Clone)]
pub struct AppliedSelection {
    pub selection: Selection,
    pub kind: ChangeKind,
    /// Human-readable field diffs, for logging.
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("instrument {0} is not offered")]
    UnknownInstrument(Instrument),
    #[error("range {range} is not one of {offered:?}")]
    RangeNotOffered { range: usize, offered: Vec<usize> },
    #[error("only one indicator may be enabled, got {0}")]
    TooManyIndicators(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> (Selection, DashboardConfig) {
        let cfg = DashboardConfig::default();
        (cfg.initial_selection(), cfg)
    }

    #[test]
    fn instrument_change_is_data_affecting() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            instrument: Some("eth-usd".into()),
            ..Default::default()
        };
        let applied = sel.apply(&update, &cfg).unwrap();
        assert_eq!(applied.kind, ChangeKind::Data);
        assert_eq!(applied.selection.instrument.as_str(), "ETH-USD");
        assert_eq!(applied.changes.len(), 1);
    }

    #[test]
    fn interval_change_is_data_affecting() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            interval: Some(Interval::Hour),
            ..Default::default()
        };
        assert_eq!(sel.apply(&update, &cfg).unwrap().kind, ChangeKind::Data);
    }

    #[test]
    fn range_change_is_display_only() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            range: Some(90),
            chart_type: Some(ChartType::Ohlc),
            ..Default::default()
        };
        let applied = sel.apply(&update, &cfg).unwrap();
        assert_eq!(applied.kind, ChangeKind::Display);
        assert_eq!(applied.selection.range, 90);
        assert_eq!(applied.changes.len(), 2);
    }

    #[test]
    fn identical_update_changes_nothing() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            instrument: Some("BTC-USD".into()),
            range: Some(30),
            ..Default::default()
        };
        let applied = sel.apply(&update, &cfg).unwrap();
        assert_eq!(applied.kind, ChangeKind::None);
        assert_eq!(applied.selection, sel);
    }

    #[test]
    fn lowercase_config_instruments_are_selectable() {
        let json = r#"{ "instruments": [" eth-usd ", "sol-usd"], "default_instrument": "sol-usd" }"#;
        let mut cfg: DashboardConfig = serde_json::from_str(json).unwrap();
        cfg.normalise();
        assert_eq!(cfg.default_instrument.as_str(), "SOL-USD");

        let sel = cfg.initial_selection();
        let update = SelectionUpdate {
            instrument: Some("eth-usd".into()),
            ..Default::default()
        };
        let applied = sel.apply(&update, &cfg).unwrap();
        assert_eq!(applied.selection.instrument.as_str(), "ETH-USD");
    }

    #[test]
    fn unknown_instrument_rejected() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            instrument: Some("FOO-USD".into()),
            ..Default::default()
        };
        assert_eq!(
            sel.apply(&update, &cfg).unwrap_err(),
            SelectionError::UnknownInstrument(Instrument::from("FOO-USD"))
        );
    }

    #[test]
    fn range_must_be_offered() {
        let (sel, cfg) = base();
        let update = SelectionUpdate {
            range: Some(45),
            ..Default::default()
        };
        assert!(matches!(
            sel.apply(&update, &cfg),
            Err(SelectionError::RangeNotOffered { range: 45, .. })
        ));
    }

    #[test]
    fn single_mode_limits_indicators() {
        let (sel, mut cfg) = base();
        cfg.indicator_mode = IndicatorMode::Single;
        let update = SelectionUpdate {
            indicators: Some(vec![Indicator::Ma, Indicator::Volume]),
            ..Default::default()
        };
        assert_eq!(
            sel.apply(&update, &cfg).unwrap_err(),
            SelectionError::TooManyIndicators(2)
        );

        let single = SelectionUpdate {
            indicators: Some(vec![Indicator::Ema]),
            ..Default::default()
        };
        assert!(sel.apply(&single, &cfg).is_ok());
    }

    #[test]
    fn line_chart_has_no_effective_indicators() {
        let (mut sel, _) = base();
        sel.indicators = BTreeSet::from([Indicator::Ma, Indicator::Volume]);
        sel.chart_type = ChartType::Line;
        assert!(sel.effective_indicators().is_empty());
        assert!(!sel.shows(Indicator::Ma));

        sel.chart_type = ChartType::Candlestick;
        assert!(sel.shows(Indicator::Ma));
        assert_eq!(sel.effective_indicators().len(), 2);
    }

    #[test]
    fn update_deserialises_from_partial_json() {
        let update: SelectionUpdate =
            serde_json::from_str(r#"{ "interval": "Minute", "indicators": ["Ma", "Ema"] }"#)
                .unwrap();
        assert_eq!(update.interval, Some(Interval::Minute));
        assert_eq!(update.indicators.unwrap().len(), 2);
        assert!(update.instrument.is_none());
    }
}
