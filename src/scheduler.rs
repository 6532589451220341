// =============================================================================
// Refresh Scheduler — three independent periodic refreshers
// =============================================================================
//
//   ticker     every `refresh.ticker_secs`     selection-bound
//   chart      every `refresh.chart_secs`      selection-bound
//   sentiment  every `refresh.sentiment_secs`  selection-independent
//
// A selection-bound refresher runs against a ticket (epoch + selection).  When
// the epoch changes it drops whatever fetch is in flight, takes a fresh ticket
// and fetches immediately.  A failed fetch is logged and recorded; the last
// published snapshot stays visible and the next attempt happens on the normal
// cadence.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::RefreshPeriods;
use crate::error::SourceError;
use crate::sources::{MarketDataSource, SentimentDataSource};
use crate::view_state::{PublishOutcome, RefreshPhase, Refresher, SelectionTicket, SharedViewState};

/// Owns the data sources and drives them into the shared view state.
pub struct RefreshScheduler {
    state: Arc<SharedViewState>,
    market: Arc<dyn MarketDataSource>,
    sentiment: Arc<dyn SentimentDataSource>,
    periods: RefreshPeriods,
    candle_lookback: u32,
    sentiment_lookback: u32,
}

/// Running refresher tasks.
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Abort every refresher.  In-flight fetches are dropped unpublished.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(tasks = self.tasks.len(), "refreshers stopped");
    }
}

impl RefreshScheduler {
    pub fn new(
        state: Arc<SharedViewState>,
        market: Arc<dyn MarketDataSource>,
        sentiment: Arc<dyn SentimentDataSource>,
    ) -> Self {
        let config = state.config();
        let periods = config.refresh.clone();
        let candle_lookback = config.candle_lookback;
        let sentiment_lookback = config.sentiment_lookback;

        Self {
            state,
            market,
            sentiment,
            periods,
            candle_lookback,
            sentiment_lookback,
        }
    }

    /// Start all three refreshers.  Each performs its first fetch right away.
    pub fn spawn(self) -> SchedulerHandle {
        let this = Arc::new(self);

        info!(
            ticker_secs = this.periods.ticker().as_secs(),
            chart_secs = this.periods.chart().as_secs(),
            sentiment_secs = this.periods.sentiment().as_secs(),
            "starting refreshers"
        );

        let ticker = tokio::spawn(
            Arc::clone(&this).selection_loop(Refresher::Ticker, this.periods.ticker()),
        );
        let chart = tokio::spawn(
            Arc::clone(&this).selection_loop(Refresher::Chart, this.periods.chart()),
        );
        let sentiment = tokio::spawn(Arc::clone(&this).sentiment_loop());

        SchedulerHandle {
            tasks: vec![ticker, chart, sentiment],
        }
    }

    // ── Loops ───────────────────────────────────────────────────────────

    async fn selection_loop(self: Arc<Self>, refresher: Refresher, period: Duration) {
        let mut epochs = self.state.subscribe_epoch();

        'restart: loop {
            // Mark the epoch seen before taking the ticket, so a change in
            // between still wakes `changed()` below.
            epochs.borrow_and_update();
            let ticket = self.state.ticket();
            debug!(
                refresher = %refresher,
                epoch = ticket.epoch,
                key = %ticket.selection.candle_key(),
                "refresher (re)scheduled"
            );

            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                self.state.set_phase(refresher, RefreshPhase::Scheduled);
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = epochs.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue 'restart;
                    }
                }

                self.state.set_phase(refresher, RefreshPhase::Fetching);
                let refresh = async {
                    match refresher {
                        Refresher::Chart => self.refresh_chart(&ticket).await,
                        _ => self.refresh_ticker(&ticket).await,
                    }
                };
                tokio::select! {
                    _ = refresh => {}
                    changed = epochs.changed() => {
                        debug!(
                            refresher = %refresher,
                            epoch = ticket.epoch,
                            "in-flight fetch superseded by new selection"
                        );
                        self.state.record_outcome(refresher, PublishOutcome::Discarded);
                        if changed.is_err() {
                            return;
                        }
                        continue 'restart;
                    }
                }
            }
        }
    }

    async fn sentiment_loop(self: Arc<Self>) {
        let mut timer = tokio::time::interval(self.periods.sentiment());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.state.set_phase(Refresher::Sentiment, RefreshPhase::Scheduled);
            timer.tick().await;
            self.state.set_phase(Refresher::Sentiment, RefreshPhase::Fetching);
            self.refresh_sentiment().await;
        }
    }

    // ── Single refreshes ────────────────────────────────────────────────

    /// Fetch and publish the tick for `ticket`'s instrument.
    pub async fn refresh_ticker(&self, ticket: &SelectionTicket) -> Option<PublishOutcome> {
        let result = self.market.fetch_tick(&ticket.selection.instrument).await;
        self.settle(Refresher::Ticker, Some(ticket), result, |state, tick| {
            state.publish_tick(ticket, tick)
        })
    }

    /// Fetch and publish the candle series for `ticket`'s instrument and
    /// interval.
    pub async fn refresh_chart(&self, ticket: &SelectionTicket) -> Option<PublishOutcome> {
        let key = ticket.selection.candle_key();
        let result = self.market.fetch_candles(&key, self.candle_lookback).await;
        self.settle(Refresher::Chart, Some(ticket), result, |state, candles| {
            state.publish_chart(ticket, candles)
        })
    }

    pub async fn refresh_sentiment(&self) -> Option<PublishOutcome> {
        let result = self.sentiment.fetch_sentiment(self.sentiment_lookback).await;
        self.settle(Refresher::Sentiment, None, result, |state, snapshot| {
            state.publish_sentiment(snapshot)
        })
    }

    /// Publish a successful result or record a failure.  Returns `None` on
    /// failure.
    fn settle<T>(
        &self,
        refresher: Refresher,
        ticket: Option<&SelectionTicket>,
        result: Result<T, SourceError>,
        publish: impl FnOnce(&SharedViewState, T) -> PublishOutcome,
    ) -> Option<PublishOutcome> {
        match result {
            Ok(value) => {
                let outcome = publish(&self.state, value);
                self.state.record_outcome(refresher, outcome);
                debug!(refresher = %refresher, outcome = ?outcome, "refresh complete");
                Some(outcome)
            }
            Err(err) => {
                // Failures for a superseded selection are as irrelevant as
                // its successes.
                if let Some(ticket) = ticket.filter(|t| !self.state.is_current(t)) {
                    debug!(refresher = %refresher, epoch = ticket.epoch, error = %err, "stale failure ignored");
                    self.state.record_outcome(refresher, PublishOutcome::Discarded);
                    return Some(PublishOutcome::Discarded);
                }

                let instrument = ticket.map(|t| t.selection.instrument.to_string());
                warn!(
                    refresher = %refresher,
                    instrument = instrument.as_deref().unwrap_or("-"),
                    kind = err.kind(),
                    error = %err,
                    "refresh failed, keeping previous snapshot"
                );
                self.state
                    .record_failure(refresher, Some(err.kind()), err.to_string());
                None
            }
        }
    }
}
