// =============================================================================
// Shared View State — the single source of truth the presentation reads
// =============================================================================
//
// Refreshers write, the presentation layer reads.  Every write goes through a
// publish method that first checks the selection ticket the fetch was started
// with; results for a superseded selection are discarded, never shown.
//
// Thread safety:
//   - `state_version` is an AtomicU64, bumped on every observable change only.
//   - parking_lot::RwLock on every slot.  Lock order is always
//     selection -> tick -> candle store, so a publish that validated its
//     ticket cannot race a selection change that clears the slots.
//   - The (candles, indicators) pair lives in `CandleStore` and is swapped as
//     one `Arc<ChartSnapshot>`.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::DashboardConfig;
use crate::format::{format_date, format_percent, format_usd, number_format, FormatError};
use crate::indicators::series::{tail_slice, EmaLine, SmaLine};
use crate::indicators::IndicatorEngine;
use crate::market_data::sentiment::{band_color, Tone};
use crate::market_data::{
    Candle, CandleKey, CandleStore, ChartSnapshot, SentimentSnapshot, StoreUpdate, TickSnapshot,
};
use crate::selection::{AppliedSelection, ChangeKind, Selection, SelectionError, SelectionUpdate};
use crate::types::{ChartType, Indicator, IndicatorMode, Instrument, Interval};

// =============================================================================
// Publish bookkeeping
// =============================================================================

/// Result of handing a fetched value to the view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishOutcome {
    /// The value was installed and the state version bumped.
    Published,
    /// Identical to what was already visible; nothing changed.
    Unchanged,
    /// The value belongs to a selection that is no longer current.
    Discarded,
}

/// Identifies the selection a fetch was started for.
#[derive(Debug, Clone)]
pub struct SelectionTicket {
    pub epoch: u64,
    pub selection: Selection,
}

/// The three independent refreshers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Refresher {
    Ticker,
    Chart,
    Sentiment,
}

impl Refresher {
    pub const ALL: [Refresher; 3] = [Refresher::Ticker, Refresher::Chart, Refresher::Sentiment];

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ticker => write!(f, "ticker"),
            Self::Chart => write!(f, "chart"),
            Self::Sentiment => write!(f, "sentiment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshPhase {
    Idle,
    Scheduled,
    Fetching,
    Published,
    Failed,
}

/// Per-refresher health, shown alongside the data.
#[derive(Debug, Clone, Serialize)]
pub struct RefresherStatus {
    pub refresher: Refresher,
    pub phase: RefreshPhase,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Results dropped because the selection moved on while they were in
    /// flight.
    pub discarded: u64,
}

impl RefresherStatus {
    fn new(refresher: Refresher) -> Self {
        Self {
            refresher,
            phase: RefreshPhase::Idle,
            last_success: None,
            last_failure: None,
            last_error: None,
            consecutive_failures: 0,
            discarded: 0,
        }
    }
}

/// A recorded failure for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub refresher: Refresher,
    pub message: String,
    /// Machine-readable class (`timeout`, `http_status`, `parse`, ...).
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

struct ActiveSelection {
    selection: Selection,
    epoch: u64,
}

// =============================================================================
// SharedViewState
// =============================================================================

/// Shared across all tasks via `Arc<SharedViewState>`.
pub struct SharedViewState {
    // ── Version tracking ────────────────────────────────────────────────
    state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    config: DashboardConfig,

    // ── Selection ───────────────────────────────────────────────────────
    selection: RwLock<ActiveSelection>,
    epoch_tx: watch::Sender<u64>,

    // ── Data slots ──────────────────────────────────────────────────────
    tick: RwLock<Option<Arc<TickSnapshot>>>,
    candles: CandleStore,
    sentiment: RwLock<Option<Arc<SentimentSnapshot>>>,

    // ── Operational status ──────────────────────────────────────────────
    refreshers: RwLock<[RefresherStatus; 3]>,
    recent_errors: RwLock<Vec<ErrorRecord>>,
    start_time: std::time::Instant,
}

impl SharedViewState {
    pub fn new(config: DashboardConfig) -> Self {
        let (epoch_tx, _) = watch::channel(0);
        let engine = IndicatorEngine::new(&config.ma_windows);
        debug!(windows = ?engine.windows(), "indicator engine ready");

        Self {
            state_version: AtomicU64::new(1),
            selection: RwLock::new(ActiveSelection {
                selection: config.initial_selection(),
                epoch: 0,
            }),
            epoch_tx,
            tick: RwLock::new(None),
            candles: CandleStore::new(engine),
            sentiment: RwLock::new(None),
            refreshers: RwLock::new(Refresher::ALL.map(RefresherStatus::new)),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
            config,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version.  Call after every observable
    /// mutation so push clients know fresh data is available.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Snapshot of the current selection and its epoch.
    pub fn ticket(&self) -> SelectionTicket {
        let active = self.selection.read();
        SelectionTicket {
            epoch: active.epoch,
            selection: active.selection.clone(),
        }
    }

    /// Whether `ticket` still names the active epoch.
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.selection.read().epoch == ticket.epoch
    }

    pub fn selection(&self) -> Selection {
        self.selection.read().selection.clone()
    }

    /// Receiver that yields the new epoch on every data-affecting selection
    /// change.
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }

    /// Validate and apply a user selection change.
    ///
    /// A data-affecting change (instrument or interval) starts a new epoch,
    /// drops the chart series and, if the instrument moved, the tick.  Any
    /// fetch still in flight for the old epoch will be discarded on publish.
    pub fn apply_selection(
        &self,
        update: &SelectionUpdate,
    ) -> Result<AppliedSelection, SelectionError> {
        let (applied, epoch) = {
            let mut active = self.selection.write();
            let applied = active.selection.apply(update, &self.config)?;

            match applied.kind {
                ChangeKind::None => return Ok(applied),
                ChangeKind::Display => {}
                ChangeKind::Data => {
                    if active.selection.instrument != applied.selection.instrument {
                        *self.tick.write() = None;
                    }
                    self.candles.clear();
                    active.epoch += 1;
                }
            }
            active.selection = applied.selection.clone();
            (applied, active.epoch)
        };

        if applied.kind == ChangeKind::Data {
            self.epoch_tx.send_replace(epoch);
        }
        self.increment_version();

        info!(
            kind = ?applied.kind,
            epoch,
            changes = ?applied.changes,
            "selection changed"
        );
        Ok(applied)
    }

    // ── Publishing ──────────────────────────────────────────────────────

    /// Install a tick fetched under `ticket` and fold it into the chart.
    pub fn publish_tick(&self, ticket: &SelectionTicket, tick: TickSnapshot) -> PublishOutcome {
        let active = self.selection.read();
        if active.epoch != ticket.epoch || tick.instrument != active.selection.instrument {
            debug!(
                ticket_epoch = ticket.epoch,
                epoch = active.epoch,
                instrument = %tick.instrument,
                "stale tick discarded"
            );
            return PublishOutcome::Discarded;
        }

        let tick_changed = {
            let mut slot = self.tick.write();
            if slot.as_deref() == Some(&tick) {
                false
            } else {
                *slot = Some(Arc::new(tick.clone()));
                true
            }
        };
        let chart_changed = self.candles.reconcile(&tick) == StoreUpdate::Reconciled;
        drop(active);

        if tick_changed || chart_changed {
            self.increment_version();
            PublishOutcome::Published
        } else {
            PublishOutcome::Unchanged
        }
    }

    /// Install a candle series fetched under `ticket`.
    pub fn publish_chart(&self, ticket: &SelectionTicket, candles: Vec<Candle>) -> PublishOutcome {
        let key = ticket.selection.candle_key();
        let active = self.selection.read();
        if active.epoch != ticket.epoch || active.selection.candle_key() != key {
            debug!(
                ticket_epoch = ticket.epoch,
                epoch = active.epoch,
                key = %key,
                "stale chart discarded"
            );
            return PublishOutcome::Discarded;
        }

        let latest_tick = self.tick.read().clone();
        let update = self.candles.replace(key, candles, latest_tick.as_deref());
        drop(active);

        match update {
            StoreUpdate::Replaced | StoreUpdate::Reconciled => {
                self.increment_version();
                PublishOutcome::Published
            }
            StoreUpdate::Unchanged | StoreUpdate::Skipped => PublishOutcome::Unchanged,
        }
    }

    /// Sentiment does not depend on the selection.
    pub fn publish_sentiment(&self, snapshot: SentimentSnapshot) -> PublishOutcome {
        {
            let mut slot = self.sentiment.write();
            if slot.as_deref() == Some(&snapshot) {
                return PublishOutcome::Unchanged;
            }
            *slot = Some(Arc::new(snapshot));
        }
        self.increment_version();
        PublishOutcome::Published
    }

    pub fn latest_tick(&self) -> Option<Arc<TickSnapshot>> {
        self.tick.read().clone()
    }

    pub fn chart(&self) -> Option<Arc<ChartSnapshot>> {
        self.candles.current()
    }

    pub fn sentiment(&self) -> Option<Arc<SentimentSnapshot>> {
        self.sentiment.read().clone()
    }

    // ── Refresher Status ────────────────────────────────────────────────

    /// Status changes alone do not bump the state version; they travel with
    /// the next data push.
    pub fn set_phase(&self, refresher: Refresher, phase: RefreshPhase) {
        self.refreshers.write()[refresher.index()].phase = phase;
    }

    /// Record the outcome of a completed fetch.
    pub fn record_outcome(&self, refresher: Refresher, outcome: PublishOutcome) {
        let mut statuses = self.refreshers.write();
        let status = &mut statuses[refresher.index()];
        match outcome {
            PublishOutcome::Published | PublishOutcome::Unchanged => {
                status.phase = RefreshPhase::Published;
                status.last_success = Some(Utc::now());
                status.consecutive_failures = 0;
            }
            PublishOutcome::Discarded => {
                status.phase = RefreshPhase::Idle;
                status.discarded += 1;
            }
        }
    }

    /// Record a failed refresh.  The previously published data stays visible.
    pub fn record_failure(&self, refresher: Refresher, code: Option<&str>, message: String) {
        {
            let mut statuses = self.refreshers.write();
            let status = &mut statuses[refresher.index()];
            status.phase = RefreshPhase::Failed;
            status.last_failure = Some(Utc::now());
            status.last_error = Some(message.clone());
            status.consecutive_failures += 1;
        }

        let record = ErrorRecord {
            refresher,
            message,
            code: code.map(str::to_string),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    pub fn refresher_status(&self, refresher: Refresher) -> RefresherStatus {
        self.refreshers.read()[refresher.index()].clone()
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.recent_errors.read().clone()
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build the complete presentation payload.
    ///
    /// Ticker and chart are only included when they belong to the current
    /// selection.  Selection and data slots are read under one selection lock
    /// so the payload never mixes two selections.
    pub fn build_snapshot(&self) -> Result<ViewSnapshot, FormatError> {
        let version = self.current_state_version();

        let (selection, tick, chart) = {
            let active = self.selection.read();
            let tick = self.tick.read().clone();
            (active.selection.clone(), tick, self.candles.current())
        };

        let ticker = tick
            .filter(|t| t.instrument == selection.instrument)
            .map(|t| TickerView::from_tick(&t))
            .transpose()?;

        let key = selection.candle_key();
        let chart = chart
            .filter(|c| c.key == key)
            .map(|c| ChartView::build(&c, &selection))
            .transpose()?;

        let sentiment = self.sentiment().map(|s| SentimentView::from_snapshot(&s));

        Ok(ViewSnapshot {
            version,
            generated_at: Utc::now(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            effective_indicators: selection.effective_indicators(),
            selection,
            options: OptionsView::from_config(&self.config),
            ticker,
            chart,
            sentiment,
            refreshers: self.refreshers.read().to_vec(),
            recent_errors: self.recent_errors(),
        })
    }
}

// =============================================================================
// Views
// =============================================================================

/// Everything the presentation layer renders, in one serialisable value.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub selection: Selection,
    pub effective_indicators: BTreeSet<Indicator>,
    pub options: OptionsView,
    pub ticker: Option<TickerView>,
    pub chart: Option<ChartView>,
    pub sentiment: Option<SentimentView>,
    pub refreshers: Vec<RefresherStatus>,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Choices the user may pick from.
#[derive(Debug, Clone, Serialize)]
pub struct OptionsView {
    pub instruments: Vec<Instrument>,
    pub intervals: Vec<Interval>,
    pub ranges: Vec<usize>,
    pub chart_types: Vec<ChartType>,
    pub indicators: Vec<Indicator>,
    pub indicator_mode: IndicatorMode,
}

impl OptionsView {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            instruments: config.instruments.clone(),
            intervals: Interval::ALL.to_vec(),
            ranges: config.range_options.clone(),
            chart_types: ChartType::ALL.to_vec(),
            indicators: Indicator::ALL.to_vec(),
            indicator_mode: config.indicator_mode,
        }
    }
}

/// Display-ready ticker metrics.
#[derive(Debug, Clone, Serialize)]
pub struct TickerView {
    pub instrument: Instrument,
    pub symbol: String,
    pub value: f64,
    pub price: String,
    pub day_high: String,
    pub day_low: String,
    pub lifetime_high: String,
    pub lifetime_high_date: String,
    pub change_24h: String,
    pub change_7d: String,
    pub change_30d: String,
    pub change_1y: String,
    pub from_lifetime_high: String,
}

impl TickerView {
    pub fn from_tick(tick: &TickSnapshot) -> Result<Self, FormatError> {
        Ok(Self {
            instrument: tick.instrument.clone(),
            symbol: tick.instrument.base_symbol().to_string(),
            value: tick.value,
            price: format_usd(tick.value)?,
            day_high: format_usd(tick.day_high)?,
            day_low: format_usd(tick.day_low)?,
            lifetime_high: format_usd(tick.lifetime_high)?,
            lifetime_high_date: format_date(tick.lifetime_high_at),
            change_24h: format_percent(tick.day_change_pct)?,
            change_7d: format_percent(tick.week_change_pct)?,
            change_30d: format_percent(tick.month_change_pct)?,
            change_1y: format_percent(tick.year_change_pct)?,
            from_lifetime_high: format_percent(tick.from_lifetime_high_pct)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeColor {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartCandle {
    #[serde(flatten)]
    pub candle: Candle,
    pub time: DateTime<Utc>,
    pub volume_color: VolumeColor,
}

/// Last visible SMA value for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaAnnotation {
    pub window: usize,
    pub value: Option<String>,
}

/// The displayed slice of the chart series.
#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub key: CandleKey,
    pub chart_type: ChartType,
    pub range: usize,
    pub candles: Vec<ChartCandle>,
    pub show_volume: bool,
    pub sma: Vec<SmaLine>,
    pub ema: Vec<EmaLine>,
    pub ma_annotations: Vec<MaAnnotation>,
    pub reconciled_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ChartView {
    /// Cut `snapshot` down to the selected range.  Overlays were computed over
    /// the whole history, so only the tail is taken here.
    pub fn build(snapshot: &ChartSnapshot, selection: &Selection) -> Result<Self, FormatError> {
        let range = selection.range;
        let candles = tail_slice(&snapshot.candles, range)
            .iter()
            .map(|&candle| ChartCandle {
                candle,
                time: candle.time(),
                volume_color: if candle.is_up() {
                    VolumeColor::Up
                } else {
                    VolumeColor::Down
                },
            })
            .collect();

        let overlays = snapshot.indicators.tail(range);
        let sma = if selection.shows(Indicator::Ma) {
            overlays.sma
        } else {
            Vec::new()
        };
        let ema = if selection.shows(Indicator::Ema) {
            overlays.ema
        } else {
            Vec::new()
        };

        let ma_annotations = sma
            .iter()
            .map(|line| {
                let value = line
                    .values
                    .last()
                    .copied()
                    .flatten()
                    .map(number_format)
                    .transpose()?;
                Ok(MaAnnotation {
                    window: line.window,
                    value,
                })
            })
            .collect::<Result<Vec<_>, FormatError>>()?;

        Ok(Self {
            key: snapshot.key.clone(),
            chart_type: selection.chart_type,
            range,
            candles,
            show_volume: selection.shows(Indicator::Volume),
            sma,
            ema,
            ma_annotations,
            reconciled_price: snapshot.reconciled_price,
            updated_at: snapshot.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentPoint {
    pub timestamp: DateTime<Utc>,
    pub value: u8,
    pub classification: String,
    pub color: &'static str,
}

/// Gauge, badge and history of the sentiment index.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentView {
    pub value: u8,
    pub classification: String,
    pub tone: Tone,
    pub previous_value: u8,
    pub change: i16,
    pub points: Vec<SentimentPoint>,
}

impl SentimentView {
    pub fn from_snapshot(snapshot: &SentimentSnapshot) -> Self {
        let latest = snapshot.latest();
        Self {
            value: latest.value,
            classification: latest.classification.to_string(),
            tone: latest.classification.tone(),
            previous_value: snapshot.previous().value,
            change: snapshot.change(),
            points: snapshot
                .entries()
                .iter()
                .map(|e| SentimentPoint {
                    timestamp: e.timestamp,
                    value: e.value,
                    classification: e.classification.to_string(),
                    color: band_color(e.value),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::tick::change_from_high_pct;
    use crate::market_data::{SentimentClass, SentimentEntry};
    use chrono::TimeZone;

    fn state() -> SharedViewState {
        SharedViewState::new(DashboardConfig::default())
    }

    fn daily(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 40_000.0 + (i as f64 * 37.0) % 900.0;
                Candle::new(i as i64 * 86_400, base, base + 150.0, base - 120.0, base + 20.0, 10.0 + i as f64)
            })
            .collect()
    }

    fn tick(inst: &str, value: f64) -> TickSnapshot {
        TickSnapshot {
            instrument: Instrument::from(inst),
            value,
            day_high: value * 1.01,
            day_low: value * 0.99,
            lifetime_high: 73_750.07,
            lifetime_high_at: Utc.timestamp_opt(1_710_417_600, 0).unwrap(),
            day_change_pct: 1.234,
            week_change_pct: -2.5,
            month_change_pct: 8.75,
            year_change_pct: 51.2,
            from_lifetime_high_pct: change_from_high_pct(value, 73_750.07),
        }
    }

    fn sentiment(values: &[u8]) -> SentimentSnapshot {
        SentimentSnapshot::from_entries(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| SentimentEntry {
                    timestamp: Utc.timestamp_opt(i as i64 * 86_400, 0).unwrap(),
                    value: v,
                    classification: SentimentClass::Neutral,
                })
                .collect(),
        )
        .unwrap()
    }

    fn eth() -> SelectionUpdate {
        SelectionUpdate {
            instrument: Some("ETH-USD".into()),
            ..Default::default()
        }
    }

    #[test]
    fn tick_is_reconciled_into_displayed_chart() {
        let s = state();
        s.apply_selection(&SelectionUpdate {
            indicators: Some(vec![Indicator::Volume, Indicator::Ma]),
            ..Default::default()
        })
        .unwrap();
        let t = s.ticket();

        let candles = daily(300);
        let price = candles.iter().map(|c| c.high).fold(0.0, f64::max) + 1_000.0;
        assert_eq!(s.publish_chart(&t, candles.clone()), PublishOutcome::Published);
        assert_eq!(s.publish_tick(&t, tick("BTC-USD", price)), PublishOutcome::Published);

        let snap = s.build_snapshot().unwrap();
        let chart = snap.chart.expect("chart visible");
        assert_eq!(chart.candles.len(), 30);
        let last = chart.candles.last().unwrap().candle;
        assert_eq!(last.high, price);
        assert_eq!(last.close, price);

        // MA(7) over the reconciled closes.
        let mut closes: Vec<f64> = candles[293..].iter().map(|c| c.close).collect();
        *closes.last_mut().unwrap() = price;
        let expected = closes.iter().sum::<f64>() / 7.0;
        let ma7 = chart.sma.iter().find(|l| l.window == 7).unwrap();
        assert_eq!(ma7.values.len(), 30);
        assert!((ma7.values.last().unwrap().unwrap() - expected).abs() < 1e-6);
        let annotated = number_format(ma7.values.last().unwrap().unwrap()).unwrap();
        assert_eq!(chart.ma_annotations[0].window, 7);
        assert_eq!(chart.ma_annotations[0].value.as_deref(), Some(annotated.as_str()));
        assert!(chart.show_volume);
        assert!(chart.ema.is_empty());
    }

    #[test]
    fn empty_chart_publish_keeps_previous_series() {
        let s = state();
        let t = s.ticket();
        assert_eq!(s.publish_chart(&t, daily(50)), PublishOutcome::Published);
        let v = s.current_state_version();

        assert_eq!(s.publish_chart(&t, Vec::new()), PublishOutcome::Unchanged);
        assert_eq!(s.current_state_version(), v);
        assert_eq!(s.chart().unwrap().candles.len(), 50);
    }

    #[test]
    fn identical_publish_is_unchanged_and_keeps_version() {
        let s = state();
        let t = s.ticket();
        s.publish_chart(&t, daily(50));
        s.publish_tick(&t, tick("BTC-USD", 41_000.0));
        s.publish_sentiment(sentiment(&[40, 60]));
        let v = s.current_state_version();

        assert_eq!(s.publish_tick(&t, tick("BTC-USD", 41_000.0)), PublishOutcome::Unchanged);
        assert_eq!(s.publish_chart(&t, daily(50)), PublishOutcome::Unchanged);
        assert_eq!(s.publish_sentiment(sentiment(&[40, 60])), PublishOutcome::Unchanged);
        assert_eq!(s.current_state_version(), v);
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let s = state();
        let old = s.ticket();
        s.apply_selection(&eth()).unwrap();

        assert_eq!(s.publish_chart(&old, daily(10)), PublishOutcome::Discarded);
        assert_eq!(s.publish_tick(&old, tick("BTC-USD", 1.0)), PublishOutcome::Discarded);
        assert!(s.chart().is_none());
        assert!(s.latest_tick().is_none());

        let fresh = s.ticket();
        assert_eq!(fresh.selection.instrument.as_str(), "ETH-USD");
        assert_eq!(s.publish_tick(&fresh, tick("ETH-USD", 3_000.0)), PublishOutcome::Published);
    }

    #[test]
    fn tick_for_other_instrument_is_discarded() {
        let s = state();
        let t = s.ticket();
        assert_eq!(s.publish_tick(&t, tick("ETH-USD", 1.0)), PublishOutcome::Discarded);
    }

    #[test]
    fn data_change_clears_held_data_and_notifies() {
        let s = state();
        let mut rx = s.subscribe_epoch();
        let t = s.ticket();
        s.publish_chart(&t, daily(10));
        s.publish_tick(&t, tick("BTC-USD", 40_500.0));

        s.apply_selection(&SelectionUpdate {
            interval: Some(Interval::Hour),
            ..Default::default()
        })
        .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        assert!(s.chart().is_none());
        // Same instrument: the tick survives an interval change.
        assert!(s.latest_tick().is_some());

        s.apply_selection(&eth()).unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
        assert!(s.latest_tick().is_none());
    }

    #[test]
    fn display_change_keeps_epoch_and_data() {
        let s = state();
        let rx = s.subscribe_epoch();
        let t = s.ticket();
        s.publish_chart(&t, daily(100));
        let v = s.current_state_version();

        let applied = s
            .apply_selection(&SelectionUpdate {
                range: Some(90),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(applied.kind, ChangeKind::Display);
        assert!(!rx.has_changed().unwrap());
        assert!(s.current_state_version() > v);
        assert_eq!(s.ticket().epoch, t.epoch);
        assert_eq!(s.build_snapshot().unwrap().chart.unwrap().candles.len(), 90);
    }

    #[test]
    fn rejected_selection_changes_nothing() {
        let s = state();
        let v = s.current_state_version();
        assert!(s
            .apply_selection(&SelectionUpdate {
                range: Some(7),
                ..Default::default()
            })
            .is_err());
        assert_eq!(s.current_state_version(), v);
        assert_eq!(s.selection().range, 30);
    }

    #[test]
    fn line_chart_hides_overlays() {
        let s = state();
        s.apply_selection(&SelectionUpdate {
            chart_type: Some(ChartType::Line),
            indicators: Some(vec![Indicator::Ma, Indicator::Ema, Indicator::Volume]),
            ..Default::default()
        })
        .unwrap();
        let t = s.ticket();
        s.publish_chart(&t, daily(120));

        let snap = s.build_snapshot().unwrap();
        assert!(snap.effective_indicators.is_empty());
        let chart = snap.chart.unwrap();
        assert!(chart.sma.is_empty());
        assert!(chart.ema.is_empty());
        assert!(chart.ma_annotations.is_empty());
        assert!(!chart.show_volume);
    }

    #[test]
    fn volume_colors_follow_direction() {
        let s = state();
        let t = s.ticket();
        s.publish_chart(
            &t,
            vec![
                Candle::new(0, 10.0, 12.0, 9.0, 11.0, 1.0),
                Candle::new(86_400, 11.0, 12.0, 9.0, 10.0, 1.0),
                Candle::new(172_800, 10.0, 11.0, 9.0, 10.0, 1.0),
            ],
        );
        let chart = s.build_snapshot().unwrap().chart.unwrap();
        let colors: Vec<_> = chart.candles.iter().map(|c| c.volume_color).collect();
        assert_eq!(colors, vec![VolumeColor::Up, VolumeColor::Down, VolumeColor::Down]);
    }

    #[test]
    fn ticker_view_formats_metrics() {
        let view = TickerView::from_tick(&tick("BTC-USD", 64_123.45)).unwrap();
        assert_eq!(view.symbol, "BTC");
        assert_eq!(view.price, "$64,123.45");
        assert_eq!(view.lifetime_high, "$73,750.07");
        assert_eq!(view.lifetime_high_date, "14 Mar 2024");
        assert_eq!(view.change_24h, "1.23%");
        assert_eq!(view.change_7d, "-2.50%");
        assert_eq!(view.from_lifetime_high, "-13.05%");
    }

    #[test]
    fn sentiment_view_colors_and_change() {
        let view = SentimentView::from_snapshot(&sentiment(&[15, 85, 55]));
        assert_eq!(view.value, 55);
        assert_eq!(view.previous_value, 85);
        assert_eq!(view.change, -30);
        assert_eq!(view.points[0].color, "#B22222");
        assert_eq!(view.points[1].color, "#388E3C");
        assert_eq!(view.tone, Tone::Orange);
    }

    #[test]
    fn failures_are_recorded_and_capped() {
        let s = state();
        for i in 0..60 {
            s.record_failure(Refresher::Chart, Some("timeout"), format!("boom {i}"));
        }
        let errors = s.recent_errors();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors.last().unwrap().message, "boom 59");

        let status = s.refresher_status(Refresher::Chart);
        assert_eq!(status.phase, RefreshPhase::Failed);
        assert_eq!(status.consecutive_failures, 60);

        s.record_outcome(Refresher::Chart, PublishOutcome::Unchanged);
        let status = s.refresher_status(Refresher::Chart);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_success.is_some());

        s.record_outcome(Refresher::Chart, PublishOutcome::Discarded);
        assert_eq!(s.refresher_status(Refresher::Chart).discarded, 1);
    }

    #[test]
    fn snapshot_without_data_is_empty_but_valid() {
        let snap = state().build_snapshot().unwrap();
        assert!(snap.ticker.is_none());
        assert!(snap.chart.is_none());
        assert!(snap.sentiment.is_none());
        assert_eq!(snap.refreshers.len(), 3);
        assert_eq!(snap.options.instruments.len(), 25);
        assert!(serde_json::to_string(&snap).is_ok());
    }
}
